use cortex_plan::planner::ListFilter;
use cortex_plan::{sdk, Kind};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(author, version, about = "Manage subjects, exams, lessons and study sessions", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// List records of a kind (subjects, exams, studysessions, lessons).
    List {
        kind: Kind,
        #[arg(long)]
        subject_id: Option<String>,
    },
    /// Create a record from a JSON object of fields.
    Create { kind: Kind, fields: String },
    /// Merge a JSON object of fields into an existing record.
    Update { kind: Kind, id: String, fields: String },
    Delete { kind: Kind, id: String },
    /// Hours studied per subject.
    Progress,
    /// Upcoming events grouped by day.
    Calendar,
}

fn parse_fields(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("fields must be a JSON object: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let planner = sdk::new(&cli.data_dir).await?;

    match cli.command {
        Commands::List { kind, subject_id } => {
            let items = planner.list(kind, &ListFilter { subject_id }).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Commands::Create { kind, fields } => {
            let created = planner.create(kind, parse_fields(&fields)?).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Commands::Update { kind, id, fields } => {
            let updated = planner.update(kind, &id, parse_fields(&fields)?).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        Commands::Delete { kind, id } => {
            if planner.delete(kind, &id).await? {
                println!("OK");
            } else {
                anyhow::bail!("{} {} not found", kind.entity_name(), id);
            }
        }
        Commands::Progress => {
            let progress = planner.progress().await?;
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
        Commands::Calendar => {
            let days = planner.calendar().await?;
            println!("{}", serde_json::to_string_pretty(&days)?);
        }
    }

    Ok(())
}
