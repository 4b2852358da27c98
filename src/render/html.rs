use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::render::{DisplaySurface, escape};
use crate::state::store::write_atomic;

pub const TABLE_BODY_ID: &str = "crypto-table-body";
pub const STATUS_ID: &str = "last-update";

#[derive(Default)]
struct Regions {
    table_body: String,
    status: String,
}

/// Standalone HTML page rewritten on every region update.
pub struct HtmlFileSurface {
    path: PathBuf,
    reload_after: Duration,
    regions: Mutex<Regions>,
}

impl HtmlFileSurface {
    /// `reload_after` becomes the page's meta refresh interval.
    pub fn new(path: impl Into<PathBuf>, reload_after: Duration) -> Self {
        Self {
            path: path.into(),
            reload_after,
            regions: Mutex::new(Regions::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut Regions)) -> anyhow::Result<()> {
        let mut regions = self.regions.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut regions);
        write_atomic(&self.path, self.page(&regions).as_bytes())
    }

    fn page(&self, regions: &Regions) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="ru">
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="{reload}">
<title>BTC / RUB</title>
<style>
  body {{ font-family: sans-serif; margin: 2rem; }}
  table {{ border-collapse: collapse; }}
  th, td {{ padding: 0.4rem 1rem; border-bottom: 1px solid #ddd; text-align: right; }}
  .change-positive {{ color: #1a7f37; }}
  .change-negative {{ color: #cf222e; }}
  .change-neutral {{ color: #57606a; }}
  .loading {{ color: #57606a; text-align: center; }}
  .error {{ color: #cf222e; text-align: center; }}
</style>
</head>
<body>
<table>
<thead><tr><th>Market price</th><th>Volume</th><th>Total value</th><th>Change</th></tr></thead>
<tbody id="{body_id}">{body}</tbody>
</table>
<p id="{status_id}">{status}</p>
</body>
</html>
"#,
            reload = self.reload_after.as_secs().max(1),
            body_id = TABLE_BODY_ID,
            body = regions.table_body,
            status_id = STATUS_ID,
            status = escape(&regions.status),
        )
    }
}

impl DisplaySurface for HtmlFileSurface {
    fn set_table_body(&self, html: &str) -> anyhow::Result<()> {
        self.update(|regions| regions.table_body = html.to_string())
    }

    fn set_status(&self, text: &str) -> anyhow::Result<()> {
        self.update(|regions| regions.status = text.to_string())
    }
}
