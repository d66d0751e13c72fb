use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::RenderError;
use crate::html::{build_header, build_info, build_rows};
use crate::inliner::{CancelToken, CssInliner};
use crate::model::{DeviceInfo, RunList};
use crate::template::{self, Mode};

/// Where the template lives and where the un-inlined and inlined emails go.
/// `{serial}` in either output path is replaced by the drive's serial number.
#[derive(Clone, Debug)]
pub struct RenderPaths {
    pub template: PathBuf,
    pub uninlined: String,
    pub inlined: String,
}

impl RenderPaths {
    pub fn uninlined_for(&self, serial: &str) -> PathBuf { keyed_path(&self.uninlined, serial) }
    pub fn inlined_for(&self, serial: &str) -> PathBuf { keyed_path(&self.inlined, serial) }
}

fn keyed_path(pattern: &str, serial: &str) -> PathBuf {
    // serials land in file names; keep them to a single path component
    let mut safe: String = serial.trim().chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' }).collect();
    if safe.chars().all(|c| c == '.') { safe = "_".repeat(safe.len().max(1)); }
    PathBuf::from(pattern.replace("{serial}", &safe))
}

pub struct ReportRenderer<I: CssInliner> {
    pub paths: RenderPaths,
    pub inliner: Option<I>,
    pub timeout: Duration,
    pub cancel: CancelToken,
    pub mode: Mode,
}

impl<I: CssInliner> ReportRenderer<I> {
    pub fn new(paths: RenderPaths, inliner: Option<I>, timeout: Duration) -> Self {
        ReportRenderer { paths, inliner, timeout, cancel: CancelToken::new(), mode: Mode::Lenient }
    }

    /// Fills the template for this drive, stores it, inlines its CSS and returns the finished email.
    /// Without an inliner the un-inlined HTML is returned as soon as it is stored.
    pub fn render(&self, runs: &RunList, info: &DeviceInfo, drive: &str) -> Result<String, RenderError> {
        let email = self.compose(runs, info, drive)?;
        let serial = info.serial_number()?;
        let uninlined = self.paths.uninlined_for(serial);
        write_file(&uninlined, &email)?;
        log::info!("Stored email for {} at {}", serial, uninlined.to_string_lossy());
        let Some(inliner) = self.inliner.as_ref() else { return Ok(email) };
        inliner.inline(self.timeout, &self.cancel)?;
        let inlined = self.paths.inlined_for(serial);
        let out = std::fs::read_to_string(&inlined).map_err(|e| RenderError::Io { path: inlined.clone(), source: e })?;
        log::info!("Read inlined email for {} from {}", serial, inlined.to_string_lossy());
        Ok(out)
    }

    pub fn compose(&self, runs: &RunList, info: &DeviceInfo, drive: &str) -> Result<String, RenderError> {
        let tpl = std::fs::read_to_string(&self.paths.template)
            .map_err(|e| RenderError::TemplateLoad { path: self.paths.template.clone(), source: e })?;
        let rows = build_rows(runs)?;
        let attributes = build_header() + &rows;
        let info_html = build_info(info);
        let run_time = runs.current.date.format("%d/%m/%Y %H:%M").to_string();
        let drive = crate::html::html_escape(drive);
        log::debug!("Composing email: {} attributes, previous={}, baseline={}", runs.current.attributes.len(), runs.previous.is_some(), runs.baseline.is_some());
        template::substitute(&tpl, &[
            (template::DRIVE_PATH, drive.as_str()),
            (template::RUN_TIME, run_time.as_str()),
            (template::INFO, info_html.as_str()),
            (template::ATTRIBUTES, attributes.as_str()),
        ], self.mode)
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), RenderError> {
    if let Some(dir) = path.parent() && !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir).map_err(|e| RenderError::Io { path: dir.to_path_buf(), source: e })?;
    }
    std::fs::write(path, content).map_err(|e| RenderError::Io { path: path.to_path_buf(), source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use crate::model::fixtures::*;

    const TEMPLATE: &str = "<html><h1>$DRIVE_PATH</h1><p>$RUN_TIME</p><section>$INFO</section><table>$ATTRIBUTES</table></html>";

    // Copies the un-inlined file to the inlined path, tagging it so tests can tell them apart.
    struct CopyInliner { from: PathBuf, to: PathBuf, calls: Cell<usize>, fail: bool }

    impl CssInliner for CopyInliner {
        fn inline(&self, _timeout: Duration, _cancel: &CancelToken) -> Result<(), RenderError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail { return Err(RenderError::Pipeline("build exited with 1".to_string())); }
            let s = std::fs::read_to_string(&self.from).unwrap();
            std::fs::write(&self.to, format!("<!-- inlined -->{}", s)).unwrap();
            Ok(())
        }
    }

    fn setup(dir: &Path, fail: bool) -> ReportRenderer<CopyInliner> {
        std::fs::write(dir.join("email.html"), TEMPLATE).unwrap();
        let paths = RenderPaths {
            template: dir.join("email.html"),
            uninlined: dir.join("out/{serial}.html").to_string_lossy().into_owned(),
            inlined: dir.join("out/{serial}-inlined.html").to_string_lossy().into_owned(),
        };
        let inl = CopyInliner { from: paths.uninlined_for("WD-1"), to: paths.inlined_for("WD-1"), calls: Cell::new(0), fail };
        ReportRenderer::new(paths, Some(inl), Duration::from_secs(5))
    }

    fn info() -> DeviceInfo {
        [("Serial Number:", "WD-1"), ("Model Family:", "WD Red")].into_iter().collect()
    }

    #[test]
    fn render_fills_template_and_returns_inlined() {
        let dir = tempfile::tempdir().unwrap();
        let r = setup(dir.path(), false);
        let cur = run(2023, 5, 1, 14, 30, three_attrs());
        let prev = run(2023, 4, 1, 9, 0, three_attrs());
        let out = r.render(&RunList::new(&cur, Some(&prev), None), &info(), "/dev/sda").unwrap();
        assert!(out.starts_with("<!-- inlined -->"));
        let stored = std::fs::read_to_string(dir.path().join("out/WD-1.html")).unwrap();
        for tok in [template::DRIVE_PATH, template::RUN_TIME, template::INFO, template::ATTRIBUTES] { assert!(!stored.contains(tok)); }
        assert!(stored.contains("<h1>/dev/sda</h1>"));
        assert!(stored.contains("<p>01/05/2023 14:30</p>"));
        assert!(stored.contains("<table><tr class=\"attributes-table__headers-row\">"));
        assert!(stored.contains("Previous 01/04/2023"));
        assert_eq!(r.inliner.as_ref().unwrap().calls.get(), 1);
    }

    #[test]
    fn missing_template_is_template_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let r = setup(dir.path(), false);
        std::fs::remove_file(dir.path().join("email.html")).unwrap();
        let cur = run(2023, 5, 1, 14, 30, three_attrs());
        let err = r.render(&RunList::new(&cur, None, None), &info(), "/dev/sda").unwrap_err();
        assert!(matches!(err, RenderError::TemplateLoad { .. }));
        assert_eq!(r.inliner.as_ref().unwrap().calls.get(), 0);
    }

    #[test]
    fn inliner_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let r = setup(dir.path(), true);
        let cur = run(2023, 5, 1, 14, 30, three_attrs());
        let err = r.render(&RunList::new(&cur, None, None), &info(), "/dev/sda").unwrap_err();
        assert!(matches!(err, RenderError::Pipeline(_)));
        assert!(dir.path().join("out/WD-1.html").exists());
    }

    #[test]
    fn missing_inlined_output_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = setup(dir.path(), false);
        if let Some(inl) = r.inliner.as_mut() { inl.to = dir.path().join("elsewhere.html"); }
        let cur = run(2023, 5, 1, 14, 30, three_attrs());
        let err = r.render(&RunList::new(&cur, None, None), &info(), "/dev/sda").unwrap_err();
        assert!(matches!(err, RenderError::Io { ref path, .. } if path.ends_with("WD-1-inlined.html")));
    }

    #[test]
    fn skipping_inliner_returns_stored_html() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = setup(dir.path(), false);
        r.inliner = None;
        let cur = run(2023, 5, 1, 14, 30, three_attrs());
        let out = r.render(&RunList::new(&cur, None, None), &info(), "/dev/sda").unwrap();
        assert_eq!(out, std::fs::read_to_string(dir.path().join("out/WD-1.html")).unwrap());
    }

    #[test]
    fn missing_serial_is_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let r = setup(dir.path(), false);
        let cur = run(2023, 5, 1, 14, 30, three_attrs());
        let no_serial: DeviceInfo = [("Model Family:", "WD Red")].into_iter().collect();
        assert!(matches!(r.render(&RunList::new(&cur, None, None), &no_serial, "/dev/sda"), Err(RenderError::Precondition(_))));
    }

    #[test]
    fn token_in_value_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let r = setup(dir.path(), false);
        let cur = run(2023, 5, 1, 14, 30, vec![attr("1", "$RUN_TIME", 100, "$INFO")]);
        let s = r.compose(&RunList::new(&cur, None, None), &info(), "/dev/sda").unwrap();
        assert!(s.contains("\n<td>$RUN_TIME</td>"));
        assert!(s.contains("\n<td>$INFO</td>"));
    }

    #[test]
    fn template_error_wins_over_missing_serial() {
        let dir = tempfile::tempdir().unwrap();
        let r = setup(dir.path(), false);
        std::fs::remove_file(dir.path().join("email.html")).unwrap();
        let cur = run(2023, 5, 1, 14, 30, three_attrs());
        let no_serial: DeviceInfo = [("Model Family:", "WD Red")].into_iter().collect();
        assert!(matches!(r.render(&RunList::new(&cur, None, None), &no_serial, "/dev/sda"), Err(RenderError::TemplateLoad { .. })));
    }

    #[test]
    fn dot_only_serial_stays_in_directory() {
        let p = RenderPaths { template: PathBuf::from("t.html"), uninlined: "out/{serial}/mail.html".into(), inlined: "out/{serial}.i.html".into() };
        assert_eq!(p.uninlined_for(".."), PathBuf::from("out/__/mail.html"));
        assert_eq!(p.uninlined_for("."), PathBuf::from("out/_/mail.html"));
        assert_eq!(p.inlined_for("  "), PathBuf::from("out/_.i.html"));
    }

    #[test]
    fn serial_is_sanitized_for_paths() {
        let p = RenderPaths { template: PathBuf::from("t.html"), uninlined: "out/{serial}.html".into(), inlined: "out/{serial}.i.html".into() };
        assert_eq!(p.uninlined_for("../WD 1"), PathBuf::from("out/.._WD_1.html"));
    }
}
