pub mod format;
pub mod html;

use chrono::{DateTime, Local};

use crate::market_data::types::{ChangeSign, Snapshot};
use format::{format_change, format_rub, format_timestamp, format_volume};

/// Where the ticker table ends up. Two regions: the table body
/// (price, volume, total, change) and a status line.
pub trait DisplaySurface: Send + Sync {
    fn set_table_body(&self, html: &str) -> anyhow::Result<()>;
    fn set_status(&self, text: &str) -> anyhow::Result<()>;
}

/// Turns snapshots, loading and error states into table markup.
pub struct TableRenderer<S> {
    surface: S,
}

impl<S: DisplaySurface> TableRenderer<S> {
    pub fn new(surface: S) -> Self {
        Self { surface }
    }

    #[cfg(test)]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn render_loading(&self) -> anyhow::Result<()> {
        self.surface
            .set_table_body(r#"<tr><td colspan="4" class="loading">Loading…</td></tr>"#)
    }

    pub fn render(&self, snapshot: &Snapshot, at: DateTime<Local>) -> anyhow::Result<()> {
        let row = format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td class=\"{}\">{}</td></tr>",
            format_rub(snapshot.market_price_local),
            format_volume(snapshot.volume_units),
            format_rub(snapshot.total_value_local),
            change_class(snapshot.change_sign),
            format_change(snapshot.change_local),
        );

        self.surface.set_table_body(&row)?;
        self.surface
            .set_status(&format!("Last updated: {}", format_timestamp(&at)))
    }

    pub fn render_error(&self, reason: &str, at: DateTime<Local>) -> anyhow::Result<()> {
        let row = format!(
            "<tr><td colspan=\"4\" class=\"error\">Error: {}</td></tr>",
            escape(reason)
        );

        self.surface.set_table_body(&row)?;
        self.surface
            .set_status(&format!("Update failed: {}", format_timestamp(&at)))
    }
}

fn change_class(sign: ChangeSign) -> &'static str {
    match sign {
        ChangeSign::Positive => "change-positive",
        ChangeSign::Negative => "change-negative",
        ChangeSign::Zero => "change-neutral",
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
