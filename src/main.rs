use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use anyhow::Context;
use clap::{Parser, ValueEnum, ColorChoice, ArgAction, CommandFactory};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use is_terminal::IsTerminal;
mod error;
mod html;
mod inliner;
mod model;
mod render;
mod template;

use crate::inliner::NpmInliner;
use crate::render::{RenderPaths, ReportRenderer};

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

const DEFAULT_TEMPLATE: &str = "email_template/email.html";
const DEFAULT_UNINLINED: &str = "inline_tool/input/{serial}.html";
const DEFAULT_INLINED: &str = "inline_tool/output/{serial}.html";
const DEFAULT_TOOL_DIR: &str = "inline_tool";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogFormat { Text, Json }

#[derive(Parser, Debug, Default)]
#[command(
    name = "smartmail",
    about = "Render SMART attribute history into an HTML email body",
    long_about = "Render SMART attribute history (current, previous and first-ever readings) into an HTML email body, then inline its CSS with the node build in the inliner directory.",
    after_long_help = "Examples:\n  smartmail --history sda.json --drive /dev/sda\n  smartmail --history sda.json --drive /dev/sda --out mail.html --skip-inline\n  smartmail --config smartmail.toml --history sda.json --drive /dev/sda -v",
    color = ColorChoice::Auto
)]
struct Args {
    /// JSON file holding device info and the current/previous/baseline runs
    #[arg(long, short = 'H')]
    history: Option<PathBuf>,
    /// Drive identifier shown in the email, e.g. /dev/sda
    #[arg(long, short = 'd')]
    drive: Option<String>,
    #[arg(long, short = 'o')]
    out: Option<PathBuf>,
    #[arg(long, short = 't')]
    template: Option<PathBuf>,
    /// Un-inlined output path; `{serial}` is replaced by the serial number
    #[arg(long)]
    uninlined_path: Option<String>,
    /// Path the inliner writes to; `{serial}` is replaced by the serial number
    #[arg(long)]
    inlined_path: Option<String>,
    #[arg(long)]
    tool_dir: Option<PathBuf>,
    #[arg(long)]
    npm_program: Option<String>,
    #[arg(long)]
    inline_timeout_secs: Option<u64>,
    #[arg(long, default_value_t = false, help = "Require each placeholder exactly once in the template")]
    strict_template: bool,
    #[arg(long, default_value_t = false, help = "Store the email but do not run the CSS inliner")]
    skip_inline: bool,
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long, short = 'C', default_value_t = false)]
    no_color: bool,
    #[arg(long, default_value_t = false)]
    force_color: bool,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long)]
    completions_out: Option<String>,
}

#[derive(Deserialize, Default)]
struct AppConfig {
    template_path: Option<PathBuf>,
    uninlined_path: Option<String>,
    inlined_path: Option<String>,
    tool_dir: Option<PathBuf>,
    npm_program: Option<String>,
    inline_timeout_secs: Option<u64>,
    strict_template: Option<bool>,
    skip_inline: Option<bool>,
    log_format: Option<LogFormat>,
    log_path: Option<String>,
}

fn main() {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        if let Some(path) = args.completions_out.as_ref()
            && let Ok(mut f) = std::fs::File::create(path) { clap_complete::generate(sh, &mut cmd, "smartmail", &mut f); }
        else { clap_complete::generate(sh, &mut cmd, "smartmail", &mut std::io::stdout()); }
        return;
    }
    if let Some(cfg) = load_config(args.config.as_deref()) { apply_config(&mut args, cfg); }
    init_logging(&args);
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let color_default = std::io::stdout().is_terminal() && !no_color_env && term != "dumb";
    let _ = ENABLE_COLOR.set(if args.force_color { true } else { color_default && !args.no_color });
    if let Err(e) = run(&args) {
        log::error!("{:#}", e);
        eprintln!("{}", paint(&format!("error: {:#}", e), "31"));
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let history_path = args.history.as_ref().context("--history is required")?;
    let drive = args.drive.as_deref().context("--drive is required")?;
    let history = model::load_history(history_path)?;
    let renderer = build_renderer(args);
    log::info!("Rendering email for {} from {}", drive, history_path.to_string_lossy());
    let email = renderer.render(&history.run_list(), &history.device, drive)
        .with_context(|| format!("rendering email for {}", drive))?;
    match args.out.as_ref() {
        Some(p) => {
            std::fs::write(p, &email).with_context(|| format!("writing {}", p.to_string_lossy()))?;
            if !args.quiet { println!("{}", paint(&format!("Email written to {}", p.to_string_lossy()), "32")); }
        }
        None => print!("{}", email),
    }
    Ok(())
}

fn build_renderer(args: &Args) -> ReportRenderer<NpmInliner> {
    let paths = RenderPaths {
        template: args.template.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE)),
        uninlined: args.uninlined_path.clone().unwrap_or_else(|| DEFAULT_UNINLINED.to_string()),
        inlined: args.inlined_path.clone().unwrap_or_else(|| DEFAULT_INLINED.to_string()),
    };
    let inliner = if args.skip_inline { None } else {
        Some(NpmInliner::new(
            args.tool_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_TOOL_DIR)),
            args.npm_program.clone().unwrap_or_else(|| "npm".to_string()),
        ))
    };
    let timeout = Duration::from_secs(args.inline_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
    let mut r = ReportRenderer::new(paths, inliner, timeout);
    if args.strict_template { r.mode = template::Mode::Strict; }
    r
}

fn load_config(path_opt: Option<&str>) -> Option<AppConfig> {
    let explicit = path_opt.map(|s| s.to_string()).or_else(|| std::env::var("SMARTMAIL_CONFIG").ok());
    let path = explicit.clone().unwrap_or_else(|| "smartmail.toml".to_string());
    let s = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => { if explicit.is_some() { eprintln!("Failed to read config {}: {}", path, e); } return None }
    };
    match toml::from_str::<AppConfig>(&s) {
        Ok(c) => Some(c),
        Err(e) => { eprintln!("Failed to parse config {}: {}", path, e); None }
    }
}

fn apply_config(args: &mut Args, cfg: AppConfig) {
    if args.template.is_none() && let Some(v) = cfg.template_path { args.template = Some(v); }
    if args.uninlined_path.is_none() && let Some(v) = cfg.uninlined_path { args.uninlined_path = Some(v); }
    if args.inlined_path.is_none() && let Some(v) = cfg.inlined_path { args.inlined_path = Some(v); }
    if args.tool_dir.is_none() && let Some(v) = cfg.tool_dir { args.tool_dir = Some(v); }
    if args.npm_program.is_none() && let Some(v) = cfg.npm_program { args.npm_program = Some(v); }
    if args.inline_timeout_secs.is_none() && let Some(v) = cfg.inline_timeout_secs { args.inline_timeout_secs = Some(v); }
    if !args.strict_template && let Some(v) = cfg.strict_template { args.strict_template = v; }
    if !args.skip_inline && let Some(v) = cfg.skip_inline { args.skip_inline = v; }
    if args.log_format.is_none() && let Some(v) = cfg.log_format { args.log_format = Some(v); }
    if args.log_path.is_none() && let Some(v) = cfg.log_path { args.log_path = Some(v); }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if args.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = args.log_level {
        let f = match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace };
        builder.filter_level(f);
    } else if args.verbose > 0 {
        let f = if args.verbose >= 3 { log::LevelFilter::Trace } else if args.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    match args.log_format {
        Some(LogFormat::Json) => {
            builder.format(|buf, record| {
                use std::io::Write;
                let obj = serde_json::json!({
                    "ts": chrono::Local::now().to_rfc3339(),
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "msg": record.args().to_string(),
                });
                writeln!(buf, "{}", obj)
            });
        }
        Some(LogFormat::Text) => {
            builder.format(|buf, record| {
                use std::io::Write;
                writeln!(buf, "[{:<5} {}] {}", record.level(), chrono::Local::now().format("%H:%M:%S"), record.args())
            });
        }
        None => {}
    }
    if let Some(path) = args.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => { eprintln!("Failed to open log file {}: {}", path, e); }
        }
    }
    builder.init();
}

fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&false) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}
