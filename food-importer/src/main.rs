mod import;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Bulk-load a USDA FoodData Central CSV dump into the food journal
/// database.
#[derive(Debug, Parser)]
struct Args {
    /// Directory holding food.csv, food_category.csv and branded_food.csv.
    #[arg(long)]
    data_dir: PathBuf,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Rows buffered per bulk insert.
    #[arg(long, default_value_t = 500)]
    batch_size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let pool = food_journal::db::connect(&args.database_url).await?;

    let report = import::run(&pool, &args.data_dir, args.batch_size).await?;
    tracing::info!(
        foods = report.foods,
        branded = report.branded,
        ingredients = report.ingredients,
        "import finished"
    );

    Ok(())
}
