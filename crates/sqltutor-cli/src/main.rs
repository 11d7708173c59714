//! SQL Tutor CLI
//!
//! Interactive practice loop: pick a level, answer questions with SQL, and get
//! progressively more specific hints when an answer is wrong.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sqltutor_engine::{
    Advisor, AnthropicAdvisor, AttemptOutcome, AttemptReport, Config, Engine, ExerciseBank,
    ExerciseSelector, ExerciseSynthesizer, HintPolicy, HintSource, SessionStatus,
    SimilarityScorer, SqliteExecutor, TableInfo, Tier, TutorError,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

/// Number of example exercises shown per level on startup.
const EXAMPLES_PER_LEVEL: usize = 2;

/// SQL Tutor - Interactive SQL Practice
///
/// Presents query-writing exercises against a practice database, checks
/// answers by comparing result sets, and escalates hints over three attempts.
#[derive(Parser, Debug)]
#[command(name = "sqltutor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Difficulty level: beginner, intermediate or advanced (asked if omitted)
    #[arg(value_name = "LEVEL")]
    level: Option<String>,

    /// Path to configuration file (default: sqltutor.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Path to the SQLite practice database
    #[arg(short, long, value_name = "FILE")]
    database: Option<String>,

    /// Path to the JSON exercise bank
    #[arg(short, long, value_name = "FILE")]
    exercises: Option<String>,

    /// Build an in-memory practice database from this SQL script instead
    #[arg(long, value_name = "FILE")]
    init_sql: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("SQL Tutor starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run_tutor(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Runs the tutor:
/// 1. Load config, dataset and exercise bank
/// 2. Show the schema and example exercises
/// 3. Choose a level
/// 4. Run practice sessions until the learner stops
async fn run_tutor(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref database) = args.database {
        config.database.clone_from(database);
    }
    if let Some(ref exercises) = args.exercises {
        config.exercises.clone_from(exercises);
    }

    // Re-validate after overrides
    config.validate()?;

    let executor = open_dataset(&config, args.init_sql.as_deref())?;
    let tables = executor.tables()?;
    let table_names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();

    let bank = ExerciseBank::load(&config.exercises)?;
    if bank.is_empty() {
        anyhow::bail!(
            "Exercise bank '{}' contains no exercises\n\nSuggestion: Add at least one exercise to a level",
            config.exercises
        );
    }

    let advisor = connect_advisor(&config);
    let mut selector = ExerciseSelector::new(bank);
    if let Some(advisor) = &advisor {
        selector =
            selector.with_synthesizer(ExerciseSynthesizer::new(Arc::clone(advisor), &config.advisor));
    }

    print_schema(&tables);
    print_examples(&selector);

    let engine = Engine::new(
        Box::new(executor),
        SimilarityScorer::hashing(config.embedding.dimension),
        HintPolicy::new(advisor, &config.advisor),
    )
    .with_display_rows(config.display_rows);

    if !engine.hints().has_advisor() {
        println!("Using built-in hints. New exercises cannot be generated; completed levels will repeat.");
    }

    let mut input = Input::new();

    let tier = match args.level {
        Some(ref level) => level.parse::<Tier>()?,
        None => match choose_level(&mut input).await? {
            Some(tier) => tier,
            None => return Ok(()),
        },
    };

    loop {
        if !practice_session(&engine, &mut selector, tier, &table_names, &mut input).await? {
            break;
        }

        println!();
        println!("{}", "=".repeat(60));
        if !input.confirm("Try another question? (y/n): ").await? {
            break;
        }
    }

    println!();
    println!("Thanks for practicing!");
    Ok(())
}

/// Loads configuration from the given path or the current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn open_dataset(config: &Config, init_sql: Option<&str>) -> anyhow::Result<SqliteExecutor> {
    match init_sql {
        Some(script_path) => {
            let script = std::fs::read_to_string(script_path).map_err(|e| {
                anyhow::anyhow!("Failed to read SQL script '{script_path}': {e}")
            })?;
            tracing::info!(script = %script_path, "Building in-memory practice database");
            Ok(SqliteExecutor::from_script(&script)?)
        }
        None => Ok(SqliteExecutor::open(&config.database)?),
    }
}

fn connect_advisor(config: &Config) -> Option<Arc<dyn Advisor>> {
    match AnthropicAdvisor::from_config(&config.advisor) {
        Ok(advisor) => {
            println!("Advisor enabled ({})", config.advisor.model);
            Some(Arc::new(advisor))
        }
        Err(TutorError::AdvisorUnavailable { reason }) => {
            tracing::warn!(%reason, "Advisor unavailable");
            println!("Advisor unavailable ({reason}).");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Advisor setup failed");
            println!("Advisor setup failed.");
            None
        }
    }
}

/// Runs one exercise from selection to a terminal status.
///
/// Returns `false` if input ended and the tutor should stop.
async fn practice_session(
    engine: &Engine,
    selector: &mut ExerciseSelector,
    tier: Tier,
    tables: &[String],
    input: &mut Input,
) -> anyhow::Result<bool> {
    let Some(exercise) = selector.next_exercise(tier, tables).await else {
        println!("No {tier} exercises are available.");
        return Ok(false);
    };

    println!();
    println!("{}", "=".repeat(60));
    println!("SQL Practice Session - {} Level", tier.as_str().to_uppercase());
    println!("{}", "=".repeat(60));
    println!();
    println!("Question: {}", exercise.question);
    println!("Concepts: {}", exercise.concepts_text());

    if let Some(hint) = exercise.static_hint() {
        println!();
        if input.confirm("Would you like a hint? (y/n): ").await? {
            println!("Hint: {hint}");
        }
    }

    let mut session = engine.start(selector, tier, exercise);

    while !session.is_finished() {
        println!();
        if session.attempt_index() == 1 {
            println!("Enter your SQL query (end with semicolon):");
        } else {
            println!(
                "Attempt {} of {} (end with semicolon):",
                session.attempt_index(),
                session.state().max_attempts
            );
        }

        let Some(query) = input.query().await? else {
            session.abandon()?;
            return Ok(false);
        };

        let report = session.submit(&query).await?;
        print_report(&report);

        if report.status != SessionStatus::Incorrect {
            break;
        }

        loop {
            println!();
            println!("Would you like to:");
            println!("1. Try again");
            println!("2. See the solution");
            println!("3. Ask the advisor for feedback");
            let Some(choice) = input.line("Enter choice (1/2/3): ").await? else {
                session.abandon()?;
                return Ok(false);
            };

            match choice.trim() {
                "1" => {
                    session.retry()?;
                    break;
                }
                "2" => {
                    let revelation = session.reveal_solution().await?;
                    println!();
                    println!("Solution: {}", revelation.solution);
                    println!();
                    print_guidance(
                        "Understanding the solution",
                        &revelation.explanation.text,
                        revelation.explanation.source,
                    );
                    break;
                }
                "3" => {
                    let feedback = session.request_feedback().await?;
                    println!();
                    print_guidance("Feedback", &feedback.text, feedback.source);
                    if input.confirm("\nWould you like to try again? (y/n): ").await? {
                        session.retry()?;
                    } else {
                        session.abandon()?;
                    }
                    break;
                }
                _ => println!("Please enter 1, 2 or 3."),
            }
        }
    }

    if selector.tier_exhausted(tier) {
        println!();
        println!("You've completed every {tier} exercise!");
    }

    Ok(true)
}

fn print_report(report: &AttemptReport) {
    println!();
    match &report.outcome {
        AttemptOutcome::ExecutionFailed { error } => {
            println!("Error: {error}");
        }
        AttemptOutcome::Correct { result } => {
            println!("Correct! Great job!");
            if report.attempt > 1 {
                println!("   (Solved in {} attempts)", report.attempt);
            }
            if let Some((completed, total)) = report.progress {
                println!("   Progress: {completed}/{total} exercises completed at this level");
            }
            println!();
            println!("Your results:");
            println!("{result}");
        }
        AttemptOutcome::Incorrect { learner, expected } => {
            println!("Not quite right. The query runs but produces different results.");
            if let Some(score) = report.similarity {
                println!("Similarity to solution: {score}");
            }
            println!();
            println!("Your results:");
            println!("{learner}");
            println!();
            println!("Expected results:");
            println!("{expected}");
        }
        AttemptOutcome::ReferenceFailed { learner, error } => {
            println!("Your query ran, but the reference solution for this exercise failed: {error}");
            println!("This is a problem with the exercise, not with your query.");
            println!();
            println!("Your results:");
            println!("{learner}");
        }
    }

    if matches!(report.outcome, AttemptOutcome::ExecutionFailed { .. }) {
        if let Some(score) = report.similarity {
            println!("Similarity to solution: {score}");
        }
    }

    if let Some(hint) = &report.static_hint {
        println!();
        println!("Hint: {hint}");
    }

    if let Some(hint) = &report.hint {
        println!();
        let title = format!(
            "Hint ({}, attempt {}/{})",
            hint.tier, report.attempt, report.max_attempts
        );
        print_guidance(&title, &hint.text, hint.source);
    }

    if let Some(revelation) = &report.revelation {
        println!();
        println!("You've used all {} attempts.", report.max_attempts);
        println!("Solution: {}", revelation.solution);
        println!();
        print_guidance("Feedback", &revelation.explanation.text, revelation.explanation.source);
    }
}

fn print_guidance(title: &str, text: &str, source: HintSource) {
    match source {
        HintSource::Advisor => println!("{title} (advisor):"),
        HintSource::Fallback => println!("{title}:"),
    }
    println!("{}", text.trim());
}

fn print_schema(tables: &[TableInfo]) {
    println!();
    println!("{}", "=".repeat(60));
    println!("DATABASE STRUCTURE");
    println!("{}", "=".repeat(60));

    for table in tables {
        println!();
        println!("{} ({} rows)", table.name, table.row_count);
        for column in &table.columns {
            let constraints = column.constraints();
            if constraints.is_empty() {
                println!("  - {} {}", column.name, column.data_type);
            } else {
                println!(
                    "  - {} {} {}",
                    column.name,
                    column.data_type,
                    constraints.join(" ")
                );
            }
        }
    }
}

fn print_examples(selector: &ExerciseSelector) {
    println!();
    println!("{}", "=".repeat(60));
    println!("EXAMPLE EXERCISES");
    println!("{}", "=".repeat(60));

    for tier in Tier::ALL {
        let examples = selector.examples(tier, EXAMPLES_PER_LEVEL);
        if examples.is_empty() {
            continue;
        }
        println!();
        println!("{}:", tier.as_str().to_uppercase());
        for exercise in examples {
            println!("  - {}", exercise.question);
            println!("    Concepts: {}", exercise.concepts_text());
        }
    }
}

async fn choose_level(input: &mut Input) -> anyhow::Result<Option<Tier>> {
    println!();
    println!("Choose a level:");
    for (i, tier) in Tier::ALL.iter().enumerate() {
        println!("{}. {tier}", i + 1);
    }

    loop {
        let Some(choice) = input.line("Enter level (1/2/3 or name): ").await? else {
            return Ok(None);
        };

        let tier = match choice.trim() {
            "1" => Ok(Tier::Beginner),
            "2" => Ok(Tier::Intermediate),
            "3" => Ok(Tier::Advanced),
            other => other.parse::<Tier>(),
        };

        match tier {
            Ok(tier) => return Ok(Some(tier)),
            Err(e) => println!("{e}"),
        }
    }
}

/// Line-oriented reader over stdin.
struct Input {
    lines: Lines<BufReader<Stdin>>,
}

impl Input {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Prints a prompt and reads one line. `None` means input ended.
    async fn line(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        print!("{prompt}");
        std::io::stdout().flush()?;
        Ok(self.lines.next_line().await?)
    }

    /// Reads a query that may span several lines and ends with `;`.
    async fn query(&mut self) -> anyhow::Result<Option<String>> {
        let mut query = String::new();
        loop {
            let prompt = if query.is_empty() { "> " } else { "  " };
            let Some(line) = self.line(prompt).await? else {
                return Ok((!query.trim().is_empty()).then_some(query));
            };

            if !query.is_empty() {
                query.push('\n');
            }
            query.push_str(line.trim_end());

            if query.trim_end().ends_with(';') {
                return Ok(Some(query.trim().to_string()));
            }
        }
    }

    async fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        Ok(self
            .line(prompt)
            .await?
            .is_some_and(|answer| answer.trim().eq_ignore_ascii_case("y")))
    }
}
