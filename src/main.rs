use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use portfolio_pulse_lib::build_dashboard;
use portfolio_pulse_lib::controller::{Dashboard, DashboardEvent, RefreshOutcome};
use portfolio_pulse_lib::error::DashboardError;
use portfolio_pulse_lib::insights::format::render_text;
use portfolio_pulse_lib::portfolio::filter::{FilterCriteria, SortKey};
use portfolio_pulse_lib::portfolio::metrics::RiskLevel;
use portfolio_pulse_lib::portfolio::MetricKind;
use portfolio_pulse_lib::scheduler::RefreshScheduler;
use portfolio_pulse_lib::state::AppState;
use portfolio_pulse_lib::types::Config;

const USAGE: &str = "\
Usage: portfolio-pulse [--config PATH] [--offline] <command> [options]

Commands:
  summary                 Portfolio aggregate (JSON)
  list                    Filtered solutions with derived metrics (JSON)
      --search TEXT         Case-insensitive match on name, problem, solution
      --area A              Repeatable
      --owner O             Repeatable
      --maturity M          Repeatable
      --target-user U       Repeatable
      --sort KEY            name|maturity|area|owner, suffix -desc to reverse
      --below-target        Latest value below target on UX or BI
      --not-updated ux|bi   Current month missing or zero
      --risk LEVEL          critical|monitor|datagaps
      --month N             Month treated as current (1-12)
  governance              Governance report (JSON)
  narrative [--html]      AI narrative summary
  refresh                 Fetch the feed now and update the cache
  watch                   Keep refreshing on the configured interval

Options:
  --config PATH           Config file (default ~/.portfolio-pulse/config.json)
  --offline               Use the cached snapshot only
  -h, --help              Show this help
";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Summary,
    List,
    Governance,
    Narrative { html: bool },
    Refresh,
    Watch,
}

impl Command {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "summary" => Some(Command::Summary),
            "list" => Some(Command::List),
            "governance" => Some(Command::Governance),
            "narrative" => Some(Command::Narrative { html: false }),
            "refresh" => Some(Command::Refresh),
            "watch" => Some(Command::Watch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    config_path: Option<PathBuf>,
    offline: bool,
    show_help: bool,
    command: Option<Command>,
    criteria: FilterCriteria,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    let exit_code = run(std::env::args_os(), &mut stdout, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run<I, W, E>(args: I, out: &mut W, err: &mut E) -> i32
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let options = match parse_args(args) {
        Ok(options) => options,
        Err(message) => {
            let _ = writeln!(err, "error: {message}");
            let _ = write!(err, "{USAGE}");
            return 2;
        }
    };

    if options.show_help {
        return if write!(out, "{USAGE}").is_ok() { 0 } else { 1 };
    }

    let Some(command) = options.command.clone() else {
        let _ = writeln!(err, "error: missing command");
        let _ = write!(err, "{USAGE}");
        return 2;
    };

    let state = match AppState::new(options.config_path.clone()) {
        Ok(state) => state,
        Err(message) => {
            let _ = writeln!(err, "error: {message}");
            return 1;
        }
    };
    let Some(config) = state.config() else {
        let _ = writeln!(
            err,
            "error: no usable config at {}",
            state.config_path.display()
        );
        return 1;
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let _ = writeln!(err, "error: failed to start runtime: {error}");
            return 1;
        }
    };

    match runtime.block_on(execute(&options, command, &config, out, err)) {
        Ok(()) => 0,
        Err(error) => {
            log::error!("{}", error);
            let _ = writeln!(err, "error: {error}");
            let _ = writeln!(err, "hint: {}", error.recovery_suggestion());
            1
        }
    }
}

async fn execute<W, E>(
    options: &CliOptions,
    command: Command,
    config: &Config,
    out: &mut W,
    err: &mut E,
) -> Result<(), DashboardError>
where
    W: Write,
    E: Write,
{
    let dashboard = Arc::new(build_dashboard(config)?);

    match command {
        Command::Watch => {
            if options.offline {
                return Err(DashboardError::Configuration(
                    "`watch` cannot run with --offline".to_string(),
                ));
            }
            let scheduler = RefreshScheduler::new(dashboard.clone(), config.refresh_interval_hours);
            scheduler.run().await;
            Ok(())
        }
        Command::Refresh => {
            if options.offline {
                return Err(DashboardError::Configuration(
                    "`refresh` cannot run with --offline".to_string(),
                ));
            }
            let outcome = dashboard.refresh().await?;
            report_notices(&dashboard, err);
            let line = match outcome {
                RefreshOutcome::Live { solutions } => format!("Fetched {solutions} solutions"),
                RefreshOutcome::Fallback { solutions } => {
                    format!("Feed unavailable; kept {solutions} cached solutions")
                }
                RefreshOutcome::Superseded => "Refresh superseded".to_string(),
            };
            write_line(out, &line)
        }
        command => {
            load(&dashboard, config, options.offline).await?;
            report_notices(&dashboard, err);
            dashboard
                .dispatch(DashboardEvent::SetCriteria(options.criteria.clone()))
                .await?;

            match command {
                Command::Summary => write_json(out, &dashboard.summary()),
                Command::List => write_json(out, &dashboard.rows()),
                Command::Governance => write_json(out, &dashboard.governance()),
                Command::Narrative { html } => {
                    let narrative = dashboard.narrative().await;
                    report_notices(&dashboard, err);
                    if html {
                        write_line(out, &narrative.html)
                    } else {
                        write_line(out, render_text(&narrative.document).trim_end())
                    }
                }
                Command::Refresh | Command::Watch => Ok(()),
            }
        }
    }
}

/// Cache first; go to the network only when the cache is missing or stale.
/// A failed fetch is fatal only when nothing is loaded.
async fn load(dashboard: &Arc<Dashboard>, config: &Config, offline: bool) -> Result<(), DashboardError> {
    match dashboard.load_cached() {
        Ok(_) => {}
        Err(DashboardError::NoData) if !offline => {}
        Err(e) => return Err(e),
    }
    if offline {
        return Ok(());
    }
    let scheduler = RefreshScheduler::new(dashboard.clone(), config.refresh_interval_hours);
    if scheduler.is_due() {
        if let Err(e) = dashboard.refresh().await {
            if dashboard.snapshot().origin.is_none() {
                return Err(e);
            }
            log::warn!("Refresh failed, continuing with the loaded snapshot: {}", e);
        }
    }
    Ok(())
}

fn report_notices<E: Write>(dashboard: &Dashboard, err: &mut E) {
    let state = dashboard.snapshot();
    if let Some(banner) = &state.banner {
        let _ = writeln!(err, "warning: {} ({})", banner.message, banner.recovery_suggestion);
    }
    if let Some(drift) = &state.header_drift {
        let _ = writeln!(
            err,
            "notice: sheet is missing expected headers: {}",
            drift.missing_headers.join(", ")
        );
    }
}

fn write_json<W: Write, T: serde::Serialize>(out: &mut W, value: &T) -> Result<(), DashboardError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| DashboardError::Cache(format!("failed to serialize output: {e}")))?;
    write_line(out, &json)
}

fn write_line<W: Write>(out: &mut W, line: &str) -> Result<(), DashboardError> {
    writeln!(out, "{line}").map_err(|e| DashboardError::Cache(format!("failed writing output: {e}")))
}

fn parse_args<I>(args: I) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut iter = args.into_iter();
    let _argv0 = iter.next();

    let mut options = CliOptions {
        config_path: None,
        offline: false,
        show_help: false,
        command: None,
        criteria: FilterCriteria::default(),
    };
    let mut list_flags = false;
    let mut html = false;

    while let Some(argument) = iter.next() {
        let arg = argument.to_string_lossy().into_owned();

        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String, String> {
            match inline.clone() {
                Some(v) => Ok(v),
                None => iter
                    .next()
                    .map(|v| v.to_string_lossy().into_owned())
                    .ok_or_else(|| format!("missing argument for `{name}`")),
            }
        };

        match flag.as_str() {
            "-h" | "--help" => options.show_help = true,
            "--offline" => options.offline = true,
            "--config" => options.config_path = Some(PathBuf::from(value("--config")?)),
            "--html" => html = true,
            "--search" => {
                options.criteria.search = value("--search")?;
                list_flags = true;
            }
            "--area" => {
                options.criteria.areas.insert(value("--area")?);
                list_flags = true;
            }
            "--owner" => {
                options.criteria.owners.insert(value("--owner")?);
                list_flags = true;
            }
            "--maturity" => {
                options.criteria.maturities.insert(value("--maturity")?);
                list_flags = true;
            }
            "--target-user" => {
                options.criteria.target_users.insert(value("--target-user")?);
                list_flags = true;
            }
            "--sort" => {
                let raw = value("--sort")?;
                let key = SortKey::parse(&raw).ok_or_else(|| format!("unknown sort key `{raw}`"))?;
                options.criteria.sort = Some(key);
                list_flags = true;
            }
            "--below-target" => {
                options.criteria.below_target_only = true;
                list_flags = true;
            }
            "--not-updated" => {
                let raw = value("--not-updated")?;
                let kind = MetricKind::parse(&raw)
                    .ok_or_else(|| format!("`--not-updated` expects ux or bi, got `{raw}`"))?;
                options.criteria.not_updated = Some(kind);
                list_flags = true;
            }
            "--risk" => {
                let raw = value("--risk")?;
                let level = RiskLevel::parse(&raw)
                    .ok_or_else(|| format!("unknown risk level `{raw}`"))?;
                options.criteria.risk_level = Some(level);
                list_flags = true;
            }
            "--month" => {
                let raw = value("--month")?;
                let month: usize = raw
                    .parse()
                    .ok()
                    .filter(|m| (1..=12).contains(m))
                    .ok_or_else(|| format!("`--month` expects 1-12, got `{raw}`"))?;
                options.criteria.as_of_month = month - 1;
            }
            word if !word.starts_with('-') => {
                if options.command.is_some() {
                    return Err(format!("unexpected argument `{word}`"));
                }
                let command =
                    Command::parse(word).ok_or_else(|| format!("unknown command `{word}`"))?;
                options.command = Some(command);
            }
            other => return Err(format!("unknown option `{other}`")),
        }
    }

    if list_flags && options.command != Some(Command::List) {
        return Err(String::from("filter options are only valid with `list`"));
    }
    if html {
        match options.command {
            Some(Command::Narrative { .. }) => {
                options.command = Some(Command::Narrative { html: true });
            }
            _ => return Err(String::from("`--html` is only valid with `narrative`")),
        }
    }

    Ok(options)
}
