use crate::error::RenderError;
use crate::model::{Attribute, DeviceInfo, RunList, INFO_LABELS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Column { Id, Name, Value, Worst, Thresh, RawValue }

const CURRENT_COLUMNS: [Column; 6] = [Column::Id, Column::Name, Column::Value, Column::Worst, Column::Thresh, Column::RawValue];
const HISTORY_COLUMNS: [Column; 4] = [Column::Value, Column::Worst, Column::Thresh, Column::RawValue];

impl Column {
    fn name(self) -> &'static str {
        match self { Column::Id => "id", Column::Name => "name", Column::Value => "value", Column::Worst => "worst", Column::Thresh => "thresh", Column::RawValue => "raw_value" }
    }

    fn is_numeric(self) -> bool { matches!(self, Column::Value | Column::Worst | Column::Thresh) }

    fn cell(self, a: &Attribute) -> String {
        match self {
            Column::Id => html_escape(&a.id),
            Column::Name => html_escape(&a.name),
            Column::Value => a.value.to_string(),
            Column::Worst => a.worst.to_string(),
            Column::Thresh => a.thresh.to_string(),
            Column::RawValue => html_escape(&a.raw_value),
        }
    }
}

pub fn build_header() -> String {
    let mut s = String::from("<tr class=\"attributes-table__headers-row\">");
    for c in CURRENT_COLUMNS { s.push_str(&format!("\n<th>{}</th>", c.name().to_uppercase())); }
    s.push_str("\n</tr>");
    s
}

/// One current row per attribute, each followed by its previous and baseline rows when those runs exist.
pub fn build_rows(runs: &RunList) -> Result<String, RenderError> {
    runs.validate()?;
    let mut s = String::new();
    for (i, attr) in runs.current.attributes.iter().enumerate() {
        push_current_row(&mut s, attr);
        if let Some(prev) = runs.previous {
            push_history_row(&mut s, "attributes-table__previous-reading", &format!("Previous {}", prev.date.format("%d/%m/%Y")), &prev.attributes[i]);
        }
        if let Some(base) = runs.baseline {
            push_history_row(&mut s, "attributes-table__original-reading", &format!("Original {}", base.date.format("%d/%m/%Y")), &base.attributes[i]);
        }
    }
    Ok(s)
}

fn push_current_row(s: &mut String, a: &Attribute) {
    s.push_str("<tr class=\"attributes-table__current-reading\">");
    for c in CURRENT_COLUMNS { push_cell(s, c, a); }
    s.push_str("\n</tr>");
}

fn push_history_row(s: &mut String, class: &str, label: &str, a: &Attribute) {
    s.push_str(&format!("<tr class=\"{}\">", class));
    s.push_str("\n<td></td>");
    s.push_str(&format!("\n<td>{}</td>", label));
    for c in HISTORY_COLUMNS { push_cell(s, c, a); }
    s.push_str("\n</tr>");
}

fn push_cell(s: &mut String, c: Column, a: &Attribute) {
    if c.is_numeric() { s.push_str(&format!("\n<td style=\"text-align: center\">{}</td>", c.cell(a))); }
    else { s.push_str(&format!("\n<td>{}</td>", c.cell(a))); }
}

pub fn build_info(info: &DeviceInfo) -> String {
    let mut s = String::new();
    for label in INFO_LABELS {
        let Some(v) = info.get(label) else { continue };
        s.push_str("<div class=\"info-section__info-row\">");
        s.push_str(&format!("\n<div class=\"info-section__info-row--name\">{}</div>", label));
        s.push_str(&format!("\n<div class=\"info-section__info-row--value\">{}</div>", html_escape(v)));
        s.push_str("\n</div>");
    }
    s
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
