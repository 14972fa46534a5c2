use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use clap_mangen::Man;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use testlink_reporter::config::{Config, ReporterConfig, TestlinkArgs};
use testlink_reporter::core::annotation::Annotation;
use testlink_reporter::core::client::CaseStatus;
use testlink_reporter::core::reporter::ResultReporter;
use testlink_reporter::core::testlink::XmlRpcClient;

#[derive(Parser)]
#[command(name = "testlink-reporter")]
#[command(about = "Report test outcomes to a TestLink server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (overrides config file)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Generate shell completions for the specified shell
    #[arg(long, value_enum)]
    completions: Option<Shell>,

    /// Generate man page
    #[arg(long)]
    man: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Parser)]
enum Commands {
    /// Submit a single test outcome to TestLink
    Report {
        #[command(flatten)]
        testlink: TestlinkArgs,

        /// Identifier of the test execution being reported
        #[arg(long)]
        test_name: String,

        /// External id of the TestLink case
        #[arg(long)]
        case: String,

        /// Outcome of the test
        #[arg(long, value_enum)]
        status: Outcome,

        /// Resolve the case's plan in this project instead of the configured one
        #[arg(long)]
        case_project: Option<String>,

        /// Report against this plan instead of the configured one
        #[arg(long)]
        case_plan: Option<String>,

        /// Free-text notes attached to the result
        #[arg(long)]
        notes: Option<String>,
    },
}

/// Outcome vocabulary of the host runner's hooks
#[derive(Clone, Copy, clap::ValueEnum)]
enum Outcome {
    Passed,
    Failed,
    /// A test that errored before completing; reported as Failed
    Error,
    Blocked,
}

impl From<Outcome> for CaseStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Passed => CaseStatus::Passed,
            Outcome::Failed | Outcome::Error => CaseStatus::Failed,
            Outcome::Blocked => CaseStatus::Blocked,
        }
    }
}

fn create_subscriber(
    verbose: bool,
    time_format: &str,
) -> Box<dyn tracing::Subscriber + Send + Sync> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let format = time::format_description::parse_owned::<2>(time_format).unwrap_or_else(|_| {
        eprintln!("Custom time format '{time_format}' not supported. Using default format.");
        time::format_description::parse_owned::<2>("[year]-[month]-[day] [hour]:[minute]:[second]")
            .unwrap()
    });

    Box::new(
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_timer(tracing_subscriber::fmt::time::LocalTime::new(format))
            .finish(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --completions flag early
    if let Some(shell) = args.completions {
        let mut app = Args::command();
        generate(shell, &mut app, "testlink-reporter", &mut io::stdout());
        return Ok(());
    }

    // Handle --man flag early
    if args.man {
        let app = Args::command();
        let man = Man::new(app);
        man.render(&mut io::stdout())?;
        return Ok(());
    }

    // Load configuration
    let file_config = if let Some(config_path) = &args.config {
        Config::load_from_file(config_path).await?
    } else {
        Config::load().await?
    };

    // Determine verbose setting and initialize logging
    let verbose = args.verbose || file_config.is_verbose_default();
    let subscriber = create_subscriber(verbose, &file_config.get_time_format());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set default subscriber");

    match args.command {
        Some(Commands::Report {
            testlink,
            test_name,
            case,
            status,
            case_project,
            case_plan,
            notes,
        }) => {
            handle_report_command(
                testlink,
                test_name,
                case,
                status,
                case_project,
                case_plan,
                notes,
                file_config,
            )
            .await
        }
        None => {
            Args::command().print_help()?;
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_report_command(
    testlink: TestlinkArgs,
    test_name: String,
    case: String,
    status: Outcome,
    case_project: Option<String>,
    case_plan: Option<String>,
    notes: Option<String>,
    file_config: Config,
) -> Result<()> {
    let settings = ReporterConfig::resolve(&testlink, &file_config)?;
    let api = Arc::new(XmlRpcClient::new(
        settings.endpoint.clone(),
        settings.key.clone(),
    )?);
    let reporter = ResultReporter::configure(settings, api).await?;

    let mut annotation = Annotation::new(&case);
    if let Some(project) = case_project {
        annotation = annotation.with_project(project);
    }
    if let Some(plan) = case_plan {
        annotation = annotation.with_plan(plan);
    }
    reporter.annotate(&test_name, annotation);
    reporter
        .record_outcome(&test_name, status.into(), notes)
        .await?;

    info!(
        "Reported case {} for test '{}' against build '{}'",
        case,
        test_name,
        reporter.build_name()
    );
    Ok(())
}
