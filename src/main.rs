use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use cyclekit::models::{CycleCorrection, SettingsUpdate, TimeRange, UserId};
use cyclekit::{Config, Session};

#[derive(Parser)]
#[command(name = "cyclekit")]
#[command(about = "Private cycle tracking and forecasting", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CYCLEKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Whose data to open
    #[arg(short, long, env = "CYCLEKIT_USER", default_value = "default")]
    user: String,

    /// Vault passphrase
    #[arg(long, env = "CYCLEKIT_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty vault for the user
    Init,

    /// Log the first day of a period (YYYY-MM-DD)
    Log {
        date: NaiveDate,
        #[arg(long)]
        period_length: Option<u32>,
    },

    /// Replace the notes on a cycle
    Notes { id: Uuid, text: String },

    /// Correct the recorded lengths of a cycle
    Correct {
        id: Uuid,
        #[arg(long)]
        cycle_length: Option<u32>,
        #[arg(long)]
        period_length: Option<u32>,
    },

    /// Delete a cycle
    Delete { id: Uuid },

    /// List recorded cycles, most recent first
    History,

    /// Next period, ovulation and fertile window
    Forecast,

    /// Day-by-day fertility across the fertile window
    Fertility,

    /// Record a basal body temperature reading in degrees Celsius
    Temp { date: NaiveDate, celsius: f64 },

    /// Ovulation detected from a sustained temperature rise
    Ovulation,

    /// Cycle statistics
    Stats {
        /// 3m, 6m, 12m or all
        #[arg(long, default_value = "all")]
        range: TimeRange,
    },

    /// Whether recent cycles are getting longer or shorter
    Trend,

    /// Regularity and symptom insights
    Insights,

    /// Show or change cycle settings
    Settings {
        #[arg(long)]
        cycle_length: Option<u32>,
        #[arg(long)]
        period_length: Option<u32>,
        #[arg(long)]
        luteal_phase: Option<u32>,
        #[arg(long)]
        show_fertility: Option<bool>,
    },

    /// Permanently delete the user's vault
    Wipe,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_filter.clone()
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    let session = Session::from_config(&config).context("resolving data directory")?;
    let user = UserId::new(cli.user.clone());
    let Some(passphrase) = cli.passphrase.as_deref() else {
        bail!("a passphrase is required (--passphrase or CYCLEKIT_PASSPHRASE)");
    };

    if let Commands::Init = cli.command {
        session.setup(&user, passphrase)?;
        println!("Created vault for {user}");
        return Ok(());
    }

    session
        .unlock(&user, passphrase)
        .with_context(|| format!("unlocking data for {user}"))?;
    let result = run(&cli, &session);
    session.lock()?;
    result
}

fn run(cli: &Cli, session: &Session) -> Result<()> {
    match &cli.command {
        // created before unlocking
        Commands::Init => Ok(()),
        Commands::Log {
            date,
            period_length,
        } => {
            let record = session.log_period(*date, *period_length)?;
            emit(cli, &record, || {
                format!("Logged period starting {} ({})", record.start_date, record.id)
            })
        }
        Commands::Notes { id, text } => {
            let record = session.edit_notes(*id, text)?;
            emit(cli, &record, || format!("Updated notes on {}", record.id))
        }
        Commands::Correct {
            id,
            cycle_length,
            period_length,
        } => {
            let record = session.correct_cycle(
                *id,
                CycleCorrection {
                    cycle_length: *cycle_length,
                    period_length: *period_length,
                },
            )?;
            emit(cli, &record, || format!("Corrected {}", record.id))
        }
        Commands::Delete { id } => {
            let record = session.delete_cycle(*id)?;
            emit(cli, &record, || format!("Deleted cycle starting {}", record.start_date))
        }
        Commands::History => {
            let history = session.history()?;
            emit(cli, &history, || {
                if history.is_empty() {
                    return "No cycles recorded".into();
                }
                history
                    .iter()
                    .map(|c| {
                        format!(
                            "{}  {}  cycle {:>4}  period {:>3}  {}",
                            c.id,
                            c.start_date,
                            days(c.cycle_length),
                            days(c.period_length),
                            c.notes
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Forecast => {
            let forecast = session.latest_forecast()?;
            emit(cli, &forecast, || match &forecast {
                Some(f) => format!(
                    "Next period:    {}\nOvulation:      {}\nFertile window: {} to {}\nAverage cycle:  {:.1} days over {} cycles",
                    f.next_period_date,
                    f.ovulation_date,
                    f.fertile_window.start,
                    f.fertile_window.end,
                    f.avg_cycle_length,
                    f.sample_size
                ),
                None => "Not enough data yet. Track at least three cycles.".into(),
            })
        }
        Commands::Fertility => {
            let outlook = session.fertility_forecast()?;
            emit(cli, &outlook, || {
                if outlook.is_empty() {
                    return "Not enough data yet. Track at least three cycles.".into();
                }
                outlook
                    .iter()
                    .map(|d| {
                        let marker = if d.is_ovulation { "  ovulation" } else { "" };
                        format!("{}  {:>3}%{}", d.date, d.score, marker)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Temp { date, celsius } => {
            let reading = session.log_temperature(*date, *celsius)?;
            emit(cli, &reading, || {
                format!("Logged {:.2} °C on {}", reading.celsius, reading.date)
            })
        }
        Commands::Ovulation => {
            let shift = session.detected_ovulation()?;
            emit(cli, &shift, || match &shift {
                Some(s) => format!(
                    "Temperature rose {:.2} °C from {}, ovulation likely just before",
                    s.shift_celsius, s.date
                ),
                None => "No temperature shift yet. Log at least seven readings.".into(),
            })
        }
        Commands::Stats { range } => {
            let stats = session.statistics(*range)?;
            emit(cli, &stats, || match &stats {
                Some(s) => format!(
                    "Cycles:          {} ({} completed)\nAverage cycle:   {:.1} days\nAverage period:  {}\nVariability:     {} days\nRegularity:      {}/100 ({})\nLongest:         {} days from {}\nShortest:        {} days from {}\nTrend:           {}",
                    s.total_cycles,
                    s.completed_cycles,
                    s.avg_cycle_length,
                    s.avg_period_length
                        .map(|p| format!("{p:.1} days"))
                        .unwrap_or_else(|| "-".into()),
                    s.cycle_variability,
                    s.regularity_score,
                    s.consistency,
                    s.longest_cycle.length,
                    s.longest_cycle.start_date,
                    s.shortest_cycle.length,
                    s.shortest_cycle.start_date,
                    s.trend
                ),
                None => "No completed cycles in this range".into(),
            })
        }
        Commands::Trend => {
            let trend = session.trend()?;
            emit(cli, &trend, || trend.to_string())
        }
        Commands::Insights => {
            let insights = session.insights()?;
            emit(cli, &insights, || {
                if insights.is_empty() {
                    return "No insights yet".into();
                }
                insights
                    .iter()
                    .map(|i| format!("{}: {}", i.title, i.message))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Settings {
            cycle_length,
            period_length,
            luteal_phase,
            show_fertility,
        } => {
            let update = SettingsUpdate {
                cycle_length: *cycle_length,
                period_length: *period_length,
                luteal_phase_days: *luteal_phase,
                show_fertility: *show_fertility,
            };
            let changed = update.cycle_length.is_some()
                || update.period_length.is_some()
                || update.luteal_phase_days.is_some()
                || update.show_fertility.is_some();
            let settings = if changed {
                session.update_settings(&update)?
            } else {
                session.settings()?
            };
            emit(cli, &settings, || {
                format!(
                    "Cycle length:   {} days\nPeriod length:  {} days\nLuteal phase:   {} days\nShow fertility: {}",
                    settings.cycle_length,
                    settings.period_length,
                    settings.luteal_phase_days,
                    settings.show_fertility
                )
            })
        }
        Commands::Wipe => {
            let user = session.user()?;
            session.wipe()?;
            println!("Deleted all data for {user}");
            Ok(())
        }
    }
}

fn emit<T: Serialize>(cli: &Cli, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn days(value: Option<u32>) -> String {
    value.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
}
