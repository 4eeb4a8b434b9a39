//! Lockin - command line habit tracker
//!
//! Each invocation loads one month through the controller, applies a single
//! command and prints the result.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lockin::{
    config::Config,
    display::{render_habit_row, render_month},
    error::Result,
    AuthClient, AuthSession, DateWindow, Error, HabitId, HabitsMonthController, HttpGateway,
    YearMonth,
};

#[derive(Parser)]
#[command(name = "lockin")]
#[command(author, version, about = "Track monthly habits from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and remember the session
    Login {
        email: String,

        /// Read from stdin when omitted
        #[arg(long, env = "LOCKIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account and log in
    Register {
        name: String,
        email: String,

        /// Read from stdin when omitted
        #[arg(long, env = "LOCKIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the saved session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Show the habit grid for a month (default: current month)
    Show {
        #[command(flatten)]
        month: MonthArgs,
    },

    /// Add a habit
    Add { name: String },

    /// Toggle one day of a habit (only today and yesterday can be changed)
    Toggle {
        habit_id: String,
        day: u32,

        #[command(flatten)]
        month: MonthArgs,
    },

    /// Rename a habit
    Rename { habit_id: String, name: String },

    /// Delete a habit
    Delete {
        habit_id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or edit configuration
    Config {
        /// Print current configuration
        #[arg(long)]
        show: bool,

        /// Create default configuration file
        #[arg(long)]
        init: bool,
    },
}

#[derive(clap::Args)]
struct MonthArgs {
    /// Month number (1-12)
    #[arg(long, requires = "year")]
    month: Option<u32>,

    /// Four-digit year
    #[arg(long, requires = "month")]
    year: Option<i32>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("Error: {err}");
        if err.is_unauthorized() {
            eprintln!("Your session is missing or expired. Run `lockin login <email>`.");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config {
        Config::load_from(path)?
    } else {
        Config::load()?
    };
    config.validate()?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.to_lowercase()))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let session_path = config.session_path()?;
    let session = AuthSession::load_from(&session_path)?;
    let gateway = HttpGateway::new(&config.server, session.clone())?;

    match cli.command {
        Some(Commands::Login { email, password }) => {
            let password = password_or_prompt(password)?;
            let user = AuthClient::new(gateway).login(&email, &password).await?;
            session.save_to(&session_path)?;
            match user {
                Some(user) => println!("Logged in as {} <{}>", user.name, user.email),
                None => println!("Logged in as {email}"),
            }
            Ok(())
        }

        Some(Commands::Register {
            name,
            email,
            password,
        }) => {
            let password = password_or_prompt(password)?;
            AuthClient::new(gateway)
                .register(&name, &email, &password)
                .await?;
            session.save_to(&session_path)?;
            println!("Welcome, {}! You are now logged in.", name.trim());
            Ok(())
        }

        Some(Commands::Logout) => {
            AuthClient::new(gateway).logout();
            session.save_to(&session_path)?;
            println!("Logged out");
            Ok(())
        }

        Some(Commands::Whoami) => {
            let result = AuthClient::new(gateway).me().await;
            // A rejected token is cleared by `me`; persist that too.
            session.save_to(&session_path)?;
            let user = result?;
            println!("{} <{}>", user.name, user.email);
            Ok(())
        }

        Some(Commands::Show { month }) => {
            let controller = open_month(gateway, &month).await?;
            print!("{}", render_month(&controller.snapshot()));
            Ok(())
        }

        Some(Commands::Add { name }) => {
            let controller = open_month(gateway, &MonthArgs::current()).await?;
            controller.create_habit(&name).await?;
            print!("{}", render_month(&controller.snapshot()));
            Ok(())
        }

        Some(Commands::Toggle {
            habit_id,
            day,
            month,
        }) => {
            let controller = open_month(gateway, &month).await?;
            let record = controller.toggle_day(&HabitId::from(habit_id), day).await?;
            let state = if record.is_completed(day) {
                "done"
            } else {
                "not done"
            };
            println!("Day {day} marked {state}");
            println!("{}", render_habit_row(&controller.snapshot(), &record));
            Ok(())
        }

        Some(Commands::Rename { habit_id, name }) => {
            let controller = open_month(gateway, &MonthArgs::current()).await?;
            let draft = controller.request_rename(&HabitId::from(habit_id))?;
            let renamed = controller.confirm_rename(&name).await?;
            println!("Renamed '{}' to '{renamed}'", draft.current_name);
            Ok(())
        }

        Some(Commands::Delete { habit_id, yes }) => {
            let controller = open_month(gateway, &MonthArgs::current()).await?;
            let habit_id = HabitId::from(habit_id);
            controller.request_delete(&habit_id)?;

            let name = controller
                .snapshot()
                .record(&habit_id)
                .map(|r| r.name().to_string())
                .unwrap_or_default();
            if !yes && !confirm(&format!("Delete '{name}' and all of its history?"))? {
                controller.cancel_delete();
                println!("Cancelled");
                return Ok(());
            }
            controller.confirm_delete().await?;
            println!("Deleted '{name}'");
            Ok(())
        }

        Some(Commands::Config { show, init }) => {
            if init {
                let default_config = Config::default();
                default_config.save()?;
                println!(
                    "Created default configuration at {}",
                    Config::config_path()?.display()
                );
            } else if show {
                let contents = toml::to_string_pretty(&config)?;
                println!("{contents}");
            } else {
                println!("Configuration path: {}", Config::config_path()?.display());
                println!("Session file: {}", session_path.display());
            }
            Ok(())
        }

        None => {
            // Default: show the current month
            let controller = open_month(gateway, &MonthArgs::current()).await?;
            print!("{}", render_month(&controller.snapshot()));
            Ok(())
        }
    }
}

impl MonthArgs {
    const fn current() -> Self {
        Self {
            month: None,
            year: None,
        }
    }
}

/// Build a controller and load the requested month.
async fn open_month(gateway: HttpGateway, args: &MonthArgs) -> Result<HabitsMonthController> {
    let controller = HabitsMonthController::new(Arc::new(gateway), DateWindow::from_local_now());
    controller.initialize().await?;

    if let (Some(month), Some(year)) = (args.month, args.year) {
        if controller.selected() != YearMonth::new(month, year) {
            controller.load_month(month, year).await?;
        }
    }
    Ok(controller)
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    print!("Password: ");
    io::stdout().flush()?;
    let line = read_line()?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let answer = read_line()?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn read_line() -> Result<String> {
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err(Error::other("stdin closed before an answer was read"));
    }
    Ok(line)
}
