use std::fmt::Write;

use crate::features::parse_flag;
use crate::models::ContactRecord;
use crate::table::Table;

/// Continental-US fallback center when no row has usable coordinates.
pub const DEFAULT_CENTER: (f64, f64) = (39.5, -98.35);
pub const DEFAULT_ZOOM: u8 = 6;
const MAX_CONTACTS_PER_POPUP: usize = 4;

pub const COLOR_ACTIVE: &str = "green";
pub const COLOR_HIGH_LIKELIHOOD: &str = "red";
pub const COLOR_PDH: &str = "lightblue";
pub const COLOR_DEFAULT: &str = "yellow";

#[derive(Debug, Clone)]
pub struct Marker {
    pub lat: f64,
    pub lon: f64,
    pub color: &'static str,
    pub popup_html: String,
}

/// In-memory map. `render` emits a standalone Leaflet page so dashboard
/// and report surfaces can embed the markup however they like.
#[derive(Debug, Clone)]
pub struct RenderedMap {
    pub center: (f64, f64),
    pub zoom: u8,
    pub markers: Vec<Marker>,
}

impl RenderedMap {
    pub fn render(&self) -> String {
        let mut html = String::new();
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n\
             <title>Locum Opportunities Map</title>\n\
             <link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet@1.9.4/dist/leaflet.css\"/>\n\
             <script src=\"https://unpkg.com/leaflet@1.9.4/dist/leaflet.js\"></script>\n\
             <style>html,body,#map{{height:100%;margin:0;}}</style>\n\
             </head>\n<body>\n<div id=\"map\"></div>\n<script>\n\
             var map = L.map('map').setView([{lat}, {lon}], {zoom});\n\
             L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', \
             {{maxZoom: 19, attribution: '&copy; OpenStreetMap contributors'}}).addTo(map);\n",
            lat = self.center.0,
            lon = self.center.1,
            zoom = self.zoom,
        );
        for marker in &self.markers {
            let _ = write!(
                html,
                "L.circleMarker([{lat}, {lon}], {{radius: 7, color: '{color}', \
                 fillColor: '{color}', fillOpacity: 0.8}})\
                 .bindPopup('{popup}', {{maxWidth: 400}}).addTo(map);\n",
                lat = marker.lat,
                lon = marker.lon,
                color = marker.color,
                popup = js_escape(&marker.popup_html),
            );
        }
        html.push_str("</script>\n</body>\n</html>\n");
        html
    }
}

/// Builds one marker per facility row. Rows with unparseable coordinates
/// are skipped silently; every other malformation degrades to defaults.
pub fn create_map(scored: &Table, contacts: &[ContactRecord]) -> RenderedMap {
    let mut markers = Vec::new();
    for i in 0..scored.len() {
        let (lat, lon) = match (coordinate(scored, i, "lat"), coordinate(scored, i, "lon")) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => continue,
        };

        let specialty = scored.get(i, "specialty").unwrap_or("").trim().to_uppercase();
        let color = marker_color(
            scored.get(i, "active_posting").map(parse_flag).unwrap_or(false),
            scored.get(i, "high_likelihood").map(parse_flag).unwrap_or(false),
            &specialty,
        );

        markers.push(Marker {
            lat,
            lon,
            color,
            popup_html: build_popup(scored, i, &specialty, contacts),
        });
    }

    RenderedMap {
        center: map_center(scored),
        zoom: DEFAULT_ZOOM,
        markers,
    }
}

/// Color priority: active posting beats the likelihood flag, which beats
/// the PDH specialty color; everything else (HO included) is the default.
pub fn marker_color(active_posting: bool, high_likelihood: bool, specialty: &str) -> &'static str {
    if active_posting {
        return COLOR_ACTIVE;
    }
    if high_likelihood {
        return COLOR_HIGH_LIKELIHOOD;
    }
    if specialty == "PDH" {
        return COLOR_PDH;
    }
    COLOR_DEFAULT
}

fn coordinate(table: &Table, row: usize, column: &str) -> Option<f64> {
    table.get(row, column)?.trim().parse::<f64>().ok()
}

/// Mean of the parseable coordinate pairs, or the continental default.
pub fn map_center(table: &Table) -> (f64, f64) {
    let mut count = 0usize;
    let mut lat_sum = 0.0;
    let mut lon_sum = 0.0;
    for i in 0..table.len() {
        if let (Some(lat), Some(lon)) = (coordinate(table, i, "lat"), coordinate(table, i, "lon")) {
            lat_sum += lat;
            lon_sum += lon;
            count += 1;
        }
    }
    if count == 0 {
        return DEFAULT_CENTER;
    }
    (lat_sum / count as f64, lon_sum / count as f64)
}

/// Picks the popup contacts for a facility: specialty-specific contacts
/// first, any facility contact as fallback, ordered by rank ascending
/// then verification recency descending, capped at four.
pub fn select_contacts<'a>(
    contacts: &'a [ContactRecord],
    facility_id: &str,
    specialty: &str,
) -> Vec<&'a ContactRecord> {
    let mut subset: Vec<&ContactRecord> = contacts
        .iter()
        .filter(|c| {
            c.facility_id == facility_id
                && c.specialty.as_deref().unwrap_or("").trim() == specialty
        })
        .collect();
    if subset.is_empty() {
        subset = contacts
            .iter()
            .filter(|c| c.facility_id == facility_id)
            .collect();
    }

    subset.sort_by(|a, b| {
        a.rank().cmp(&b.rank()).then_with(|| {
            b.last_verified
                .as_deref()
                .unwrap_or("")
                .cmp(a.last_verified.as_deref().unwrap_or(""))
        })
    });
    subset.truncate(MAX_CONTACTS_PER_POPUP);
    subset
}

fn build_popup(table: &Table, row: usize, specialty: &str, contacts: &[ContactRecord]) -> String {
    let name = table.get(row, "facility_name").unwrap_or("Unknown");
    let score: f64 = table
        .get(row, "score")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0.0);

    let mut html = format!(
        "<div style='max-width:320px'>\
         <div style='font-weight:700;font-size:15px'>{name}</div>\
         <div style='font-size:13px;color:#555'>Score: {score:.2} &bull; {specialty}</div>"
    );

    let prep = cold_call_prep(table, row);
    if !prep.is_empty() {
        let _ = write!(
            html,
            "<div style='margin-top:6px;font-size:13px;color:#333'>{}</div>",
            prep.join("<br>")
        );
    }

    let selected = match table.get(row, "facility_id") {
        Some(id) if !id.is_empty() => select_contacts(contacts, id, specialty),
        _ => Vec::new(),
    };
    if selected.is_empty() {
        html.push_str(
            "<div style='margin-top:8px;color:#777;font-size:13px'>No contacts on file</div>",
        );
    } else {
        let _ = write!(
            html,
            "<div style='margin-top:8px'><div style='font-weight:600'>Top contacts</div>{}</div>",
            format_contacts_html(&selected)
        );
    }

    html.push_str("</div>");
    html
}

fn cold_call_prep(table: &Table, row: usize) -> Vec<String> {
    let mut prep = Vec::new();
    for (column, label) in [
        ("likely_procedures", "Likely procedures"),
        ("avg_volume", "Avg volume"),
        ("pay_expect", "Pay"),
    ] {
        if let Some(value) = table.get(row, column) {
            if !value.trim().is_empty() {
                prep.push(format!("{label}: {}", value.trim()));
            }
        }
    }
    prep
}

fn format_contacts_html(contacts: &[&ContactRecord]) -> String {
    let entries: Vec<String> = contacts.iter().map(|c| format_contact(c)).collect();
    format!(
        "<div style='margin-top:6px;'>{}</div>",
        entries
            .iter()
            .map(|e| format!("<div style='font-size:13px;color:#222'>{e}</div>"))
            .collect::<Vec<_>>()
            .join("<hr style='border:none;border-top:1px solid #eee'/>")
    )
}

fn format_contact(contact: &ContactRecord) -> String {
    let mut top = Vec::new();
    let name = contact.full_name();
    if !name.is_empty() {
        top.push(format!("<b>{name}</b>"));
    }
    if let Some(title) = present(&contact.title) {
        top.push(title.to_string());
    }
    let mut lines = top.join(" &mdash; ");

    if let Some(email) = present(&contact.email) {
        let _ = write!(lines, "<br>&#128231; <a href='mailto:{email}'>{email}</a>");
    }

    let mut phone_line = String::new();
    if let Some(phone) = present(&contact.phone) {
        let _ = write!(phone_line, "&#128222; {phone}");
        if let Some(ext) = present(&contact.ext) {
            let _ = write!(phone_line, " x{ext}");
        }
    }
    if let Some(mobile) = present(&contact.mobile) {
        if !phone_line.is_empty() {
            phone_line.push_str(" &bull; ");
        }
        let _ = write!(phone_line, "&#128241; {mobile}");
    }
    if !phone_line.is_empty() {
        let _ = write!(lines, "<br>{phone_line}");
    }
    lines
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && *v != "nan")
}

/// Escapes popup markup for embedding in a single-quoted JS string.
fn js_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '/' => out.push_str("\\/"),
            _ => out.push(c),
        }
    }
    out
}
