use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod grades;
mod models;
mod report;

use config::{Config, ConnectionArgs};
use models::{ResultFilter, ResultStatus, Transcript};

#[derive(Parser)]
#[command(name = "intranet-grades")]
#[command(about = "Course and semester averages for the school intranet", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Selection {
    /// Student email
    #[arg(long)]
    email: String,
    /// Academic year such as 2025-2026; defaults to the latest enrolled year
    #[arg(long)]
    academic_year: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(i32).range(1..=2))]
    semester: Option<i32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import exam results from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print course and semester averages for a student
    Averages {
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown grade report
    Report {
        #[command(flatten)]
        selection: Selection,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn load_transcript(
    pool: &PgPool,
    selection: &Selection,
) -> anyhow::Result<(Option<String>, Transcript)> {
    let academic_year = match &selection.academic_year {
        Some(year) => Some(year.clone()),
        None => db::list_academic_years(pool, &selection.email)
            .await?
            .into_iter()
            .next(),
    };

    let Some(year) = academic_year else {
        info!(email = %selection.email, "student has no enrollments");
        return Ok((None, Transcript::default()));
    };

    let filter = ResultFilter {
        student_email: selection.email.clone(),
        academic_year: Some(year.clone()),
        semester: selection.semester,
    };
    let results = db::fetch_exam_results(pool, &filter).await?;
    let transcript = grades::aggregate(&results, &year);
    let pending = results
        .iter()
        .filter(|result| result.status() == ResultStatus::Pending)
        .count();
    info!(
        results = results.len(),
        pending,
        courses = transcript.courses.len(),
        semesters = transcript.semesters.len(),
        "aggregated grades"
    );

    Ok((Some(year), transcript))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("intranet_grades=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_args(&cli.connection)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    info!(max_connections = config.max_connections, "connected to Postgres");

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let recorded = db::import_csv(&pool, &csv).await?;
            println!("Recorded {recorded} exam results from {}.", csv.display());
        }
        Commands::Averages { selection, json } => {
            let (_, transcript) = load_transcript(&pool, &selection).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report::to_json(&transcript))?);
                return Ok(());
            }

            if transcript.is_empty() {
                println!("No exam results found for this selection.");
                return Ok(());
            }

            println!("Course averages:");
            for course in &transcript.courses {
                println!(
                    "- {} {} (semester {}, {} credits): {} {}",
                    course.course_code,
                    course.course_name,
                    course.semester,
                    course.credits,
                    report::format_average(course.average),
                    course.status
                );
            }

            println!("Semester averages:");
            for semester in &transcript.semesters {
                println!(
                    "- {} semester {}: {} over {} credits, {}",
                    semester.academic_year,
                    semester.semester,
                    report::format_average(semester.average),
                    semester.credits,
                    semester.status
                );
            }
        }
        Commands::Report { selection, out } => {
            let (year, transcript) = load_transcript(&pool, &selection).await?;
            let report = report::build_report(
                &selection.email,
                year.as_deref(),
                selection.semester,
                &transcript,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
