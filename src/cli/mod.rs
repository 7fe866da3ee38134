//! Interaction screening CLI
//!
//! Command-line entry points for a full screening run and dataset inspection.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::ScreeningConfig;
use crate::interaction::{CombinePolicy, FeatureRecord};
use crate::pipeline::ScreeningPipeline;
use crate::utils::DataLoader;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn fmt_score(v: f64) -> String {
    if v.is_nan() { "NaN".to_string() } else { format!("{:.6}", v) }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "interaction-screening")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rank feature interactions with a designated feature using PDP curvature and SHAP interaction values")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train, evaluate and screen every feature against the interaction feature
    Run {
        /// JSON configuration file; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Project root directory
        #[arg(long)]
        root: Option<PathBuf>,

        /// Dataset CSV, relative to the root
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Dependent column
        #[arg(short, long)]
        target: Option<String>,

        /// Feature to screen against
        #[arg(short, long)]
        interaction: Option<String>,

        /// Grid points per PDP axis
        #[arg(long)]
        grid_resolution: Option<usize>,

        /// How undefined scores combine (skip_undefined, propagate)
        #[arg(long)]
        combine_policy: Option<CombinePolicy>,

        /// Boosting iterations per fold
        #[arg(long)]
        iterations: Option<usize>,

        /// Number of cross-validation folds
        #[arg(long)]
        cv_folds: Option<usize>,

        /// Results directory, relative to the root
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Rows of the ranking to print
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show data information
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,
    },
}

/// Options of the `run` command, applied over the configuration file
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub root: Option<PathBuf>,
    pub data: Option<PathBuf>,
    pub target: Option<String>,
    pub interaction: Option<String>,
    pub grid_resolution: Option<usize>,
    pub combine_policy: Option<CombinePolicy>,
    pub iterations: Option<usize>,
    pub cv_folds: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub top_k: Option<usize>,
}

impl RunOverrides {
    pub fn apply(self, mut config: ScreeningConfig) -> ScreeningConfig {
        if let Some(root) = self.root { config.root_dir = root; }
        if let Some(data) = self.data { config.data_file = data; }
        if let Some(target) = self.target { config.target_column = target; }
        if let Some(feature) = self.interaction { config.interaction_feature = feature; }
        if let Some(n) = self.grid_resolution { config.grid_resolution = n; }
        if let Some(policy) = self.combine_policy { config.combine_policy = policy; }
        if let Some(n) = self.iterations { config.model.n_estimators = n; }
        if let Some(n) = self.cv_folds { config.n_folds = n; }
        if let Some(dir) = self.output_dir { config.results_dir = dir; }
        if let Some(k) = self.top_k { config.top_k = k; }
        config
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(config_path: Option<&std::path::Path>, overrides: RunOverrides) -> anyhow::Result<()> {
    let base = match config_path {
        Some(path) => ScreeningConfig::from_file(path)?,
        None => ScreeningConfig::default(),
    };
    let config = overrides.apply(base);
    let pipeline = ScreeningPipeline::new(config)?;
    let config = pipeline.config();

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", "Interaction Screening".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("Data       ", &config.data_path().display().to_string()));
    line_box(&kv("Target     ", &config.target_column));
    line_box(&kv("Interaction", &config.interaction_feature));
    line_box(&kv("Folds      ", &config.n_folds.to_string()));
    line_box_empty();
    line_box_bottom();

    section("Model");

    step_run("Loading data");
    let start = Instant::now();
    let data = pipeline.load()?;
    step_done(&format!("{} rows × {} features in {:?}", data.n_samples(), data.n_features(), start.elapsed()));

    step_run("Splitting");
    let (train, test) = pipeline.split(&data)?;
    step_done(&format!("{} train / {} test", train.n_samples(), test.n_samples()));

    step_run(&format!("Training {} folds", config.n_folds.to_string().cyan()));
    let start = Instant::now();
    let engine = pipeline.train(&train)?;
    step_done(&format!("{:?}", start.elapsed()));

    for fold in engine.fold_reports() {
        let marker = if Some(fold.fold) == engine.best_fold() { ok("best") } else { dim("") };
        println!(
            "    {} {:<3} {} {} {}",
            muted("fold"),
            fold.fold,
            muted("RMSE"),
            format!("{:.4}", fold.rmse).white(),
            marker
        );
    }

    let model = engine.model()?;
    let metrics = pipeline.evaluate(model, &test)?;

    section("Test set");
    println!("  {:<16} {}", muted("RSD"), format!("{:.4}", metrics.rsd).white());
    println!("  {:<16} {}", muted("cc"), format!("{:.4}", metrics.cc).white());
    println!("  {:<16} {}", muted("RMSE"), format!("{:.4}", metrics.rmse).white().bold());
    println!("  {:<16} {}", muted("MSE"), format!("{:.4}", metrics.mse).white());
    println!("  {:<16} {}", muted("MAE"), format!("{:.4}", metrics.mae).white());
    println!("  {:<16} {}", muted("R²"), format!("{:.4}", metrics.r2).white().bold());

    section("Interactions");

    step_run(&format!("Screening against {}", config.interaction_feature.cyan()));
    let start = Instant::now();
    let table = pipeline.screen(model, &test)?;
    step_done(&format!("{} features in {:?}", table.len(), start.elapsed()));

    step_run("Saving");
    let path = pipeline.save(&table)?;
    step_done(&path.display().to_string());

    print_top(table.top(config.top_k));
    Ok(())
}

fn print_top(records: &[FeatureRecord]) {
    section(&format!("Top {} interaction features", records.len()));
    println!("  {:<24} {:>12} {:>12} {:>12}", muted("Feature"), muted("PDP"), muted("SHAP"), muted("Combined"));
    println!("  {}", dim(&"─".repeat(63)));
    for r in records {
        println!(
            "  {:<24} {:>12} {:>12} {:>12}",
            r.feature,
            fmt_score(r.pdp_cross_mixed_deriv).truecolor(140, 140, 140),
            fmt_score(r.shap_pair_interaction_mean_abs).truecolor(140, 140, 140),
            fmt_score(r.interaction_score_combined).white().bold()
        );
    }
    println!();
}

pub fn cmd_info(data_path: &PathBuf) -> anyhow::Result<()> {
    section("Data Info");

    let df = DataLoader::new().load_csv(data_path)?;

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), df.height());
    println!("  {:<12} {}", muted("Columns"), df.width());
    println!("  {:<12} {:.2} MB", muted("Memory"), df.estimated_size() as f64 / 1024.0 / 1024.0);
    println!();

    println!("  {:<20} {:<12} {:>6} {:>8}", muted("Column"), muted("Type"), muted("Nulls"), muted("Unique"));
    println!("  {}", dim(&"─".repeat(50)));

    for col in df.get_columns() {
        println!(
            "  {:<20} {:<12} {:>6} {:>8}",
            col.name().as_str(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count(),
            col.n_unique().unwrap_or(0)
        );
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_given_values() {
        let overrides = RunOverrides {
            interaction: Some("AGE".to_string()),
            iterations: Some(10),
            combine_policy: Some(CombinePolicy::Propagate),
            ..Default::default()
        };
        let config = overrides.apply(ScreeningConfig::default());
        assert_eq!(config.interaction_feature, "AGE");
        assert_eq!(config.model.n_estimators, 10);
        assert_eq!(config.combine_policy, CombinePolicy::Propagate);
        assert_eq!(config.target_column, "Y");
    }

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "interaction-screening", "run", "--interaction", "AGE", "--combine-policy", "propagate",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { interaction, combine_policy, .. } => {
                assert_eq!(interaction.as_deref(), Some("AGE"));
                assert_eq!(combine_policy, Some(CombinePolicy::Propagate));
            }
            Commands::Info { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1mbold\x1b[0m"), "bold");
    }
}
