//! peereval CLI — the operator-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;
mod server;

#[derive(Parser)]
#[command(name = "peereval", version, about = "Peer evaluations for team coursework")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and sample CSV templates
    Init,

    /// Check roster and rubric CSV files without importing them
    Validate {
        /// Students CSV (first_name,last_name,email,team)
        #[arg(long)]
        students: Option<PathBuf>,

        /// Rubric CSV (criterion,description,weight,max_score)
        #[arg(long)]
        rubric: Option<PathBuf>,
    },

    /// Manage the student roster
    Students {
        #[command(subcommand)]
        action: StudentsAction,
    },

    /// Manage rubrics and their criteria
    Rubric {
        #[command(subcommand)]
        action: RubricAction,
    },

    /// Start, close, and inspect evaluation rounds
    Round {
        #[command(subcommand)]
        action: RoundAction,
    },

    /// Submit an evaluation for a token
    Submit {
        /// Evaluation token (the last segment of the link)
        token: String,

        /// Criterion score as ITEM=SCORE, where ITEM is an item id or criterion name
        #[arg(long = "score", value_name = "ITEM=SCORE")]
        scores: Vec<String>,

        /// Free-text comments about the teammate
        #[arg(long, default_value = "")]
        comments: String,
    },

    /// Export a round report
    Report {
        /// Round id
        round: i64,

        /// Output file (default: peer-eval-report-round-<id>.<ext>)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: xlsx, json
        #[arg(long, default_value = "xlsx")]
        format: String,
    },

    /// Show messages recorded in the outbox
    Outbox {
        /// Maximum number of messages
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Print message bodies
        #[arg(long)]
        full: bool,
    },

    /// Serve the evaluation endpoints over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind
        #[arg(long, default_value = "5000")]
        port: u16,
    },
}

#[derive(Subcommand)]
enum StudentsAction {
    /// Import (upsert) students from a CSV file
    Import {
        /// Students CSV file
        file: PathBuf,
    },

    /// List all students
    List {
        /// Filter to one team
        #[arg(long)]
        team: Option<String>,
    },
}

#[derive(Subcommand)]
enum RubricAction {
    /// Create a rubric from a CSV file
    Import {
        /// Rubric CSV file
        file: PathBuf,

        /// Rubric name
        #[arg(long, default_value = "Uploaded Rubric")]
        name: String,
    },

    /// List rubrics
    List,

    /// Show a rubric with its criteria
    Show {
        /// Rubric id
        id: i64,
    },

    /// Delete a rubric and its criteria
    Delete {
        /// Rubric id
        id: i64,
    },

    /// Add a criterion to a rubric
    AddItem {
        /// Rubric id
        rubric: i64,

        /// Criterion name
        #[arg(long)]
        criterion: String,

        /// Criterion description
        #[arg(long)]
        description: Option<String>,

        /// Weight in the overall score
        #[arg(long, default_value = "1.0")]
        weight: f64,

        /// Highest allowed score
        #[arg(long, default_value = "5")]
        max_score: i64,
    },

    /// Delete one criterion
    DeleteItem {
        /// Rubric item id
        id: i64,
    },
}

#[derive(Subcommand)]
enum RoundAction {
    /// Start a round: create a token for every teammate pair and send links
    Start {
        /// Rubric id
        #[arg(long)]
        rubric: i64,

        /// Round name (default: "Round YYYY-MM-DD HH:MM")
        #[arg(long)]
        name: Option<String>,

        /// Create tokens without sending any messages
        #[arg(long)]
        no_send: bool,
    },

    /// Close a round; its links stop accepting submissions
    Close {
        /// Round id
        id: i64,
    },

    /// Delete a round with its tokens, responses, and outbox messages
    Delete {
        /// Round id
        id: i64,
    },

    /// List rounds with their progress
    List,

    /// List the evaluation links of a round
    Links {
        /// Round id
        id: i64,

        /// Only links that have not been submitted
        #[arg(long)]
        pending: bool,
    },

    /// Re-send links that have not been submitted yet
    Remind {
        /// Round id
        id: i64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("peereval=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let open = || commands::Context::load(cli.config.as_deref(), cli.database.clone());

    match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { students, rubric } => commands::validate::execute(students, rubric),
        Commands::Students { action } => {
            let ctx = open()?;
            match action {
                StudentsAction::Import { file } => commands::students::import(&ctx, &file),
                StudentsAction::List { team } => commands::students::list(&ctx, team.as_deref()),
            }
        }
        Commands::Rubric { action } => {
            let ctx = open()?;
            match action {
                RubricAction::Import { file, name } => commands::rubric::import(&ctx, &file, &name),
                RubricAction::List => commands::rubric::list(&ctx),
                RubricAction::Show { id } => commands::rubric::show(&ctx, id),
                RubricAction::Delete { id } => commands::rubric::delete(&ctx, id),
                RubricAction::AddItem {
                    rubric,
                    criterion,
                    description,
                    weight,
                    max_score,
                } => commands::rubric::add_item(&ctx, rubric, criterion, description, weight, max_score),
                RubricAction::DeleteItem { id } => commands::rubric::delete_item(&ctx, id),
            }
        }
        Commands::Round { action } => {
            let ctx = open()?;
            match action {
                RoundAction::Start {
                    rubric,
                    name,
                    no_send,
                } => commands::round::start(&ctx, rubric, name.as_deref(), !no_send).await,
                RoundAction::Close { id } => commands::round::close(&ctx, id),
                RoundAction::Delete { id } => commands::round::delete(&ctx, id),
                RoundAction::List => commands::round::list(&ctx),
                RoundAction::Links { id, pending } => commands::round::links(&ctx, id, pending),
                RoundAction::Remind { id } => commands::round::remind(&ctx, id).await,
            }
        }
        Commands::Submit {
            token,
            scores,
            comments,
        } => commands::submit::execute(&open()?, &token, &scores, comments),
        Commands::Report {
            round,
            output,
            format,
        } => commands::report::execute(&open()?, round, output, &format).await,
        Commands::Outbox { limit, full } => commands::outbox::execute(&open()?, limit, full),
        Commands::Serve { host, port } => commands::serve::execute(open()?, &host, port).await,
    }
}
