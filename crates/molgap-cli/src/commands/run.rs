//! `molgap run`: auxiliary pretraining, regressor selection and inference.

use std::path::PathBuf;

use clap::Args;
use tracing::{error, info};

use molgap_learn::{LearnResult, MoleculeTable, RunSummary, TransferPipeline};

use crate::error::{exit_code_for_error, CliExitCode};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Labeled auxiliary CSV used for representation learning
    #[arg(long)]
    pub auxiliary: PathBuf,

    /// Labeled target CSV used for regressor selection
    #[arg(long)]
    pub target: PathBuf,

    /// CSV of molecules to predict
    #[arg(long)]
    pub evaluation: PathBuf,

    /// Override `runtime.output_dir`
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Continue from the checkpoint in the output directory
    #[arg(long)]
    pub resume: bool,
}

pub fn handle_run(args: RunArgs) -> i32 {
    match run(&args) {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{json}");
                CliExitCode::Success.into()
            }
            Err(e) => {
                error!(error = %e, "Failed to serialize run summary");
                CliExitCode::Failure.into()
            }
        },
        Err(e) => {
            error!(error = %e, "Run failed");
            exit_code_for_error(&e).into()
        }
    }
}

fn run(args: &RunArgs) -> LearnResult<RunSummary> {
    let mut config = super::load_config(args.config.as_deref())?;
    if let Some(dir) = &args.output_dir {
        config.runtime.output_dir = dir.clone();
    }
    if args.resume {
        config.runtime.resume = true;
    }
    let pipeline = TransferPipeline::new(config)?;
    let columns = &pipeline.config().data;

    let auxiliary = MoleculeTable::from_csv_path(&args.auxiliary, columns, true)?;
    let target = MoleculeTable::from_csv_path(&args.target, columns, true)?;
    let evaluation = MoleculeTable::from_csv_path(&args.evaluation, columns, false)?;

    let output = pipeline.run(&auxiliary, &target, &evaluation)?;
    info!(
        run_id = %output.summary.run_id,
        output_dir = %pipeline.config().runtime.output_dir.display(),
        "Artifacts written"
    );
    Ok(output.summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SMILES: &[&str] = &[
        "CCO", "CCCO", "CCCCO", "CC(C)O", "CCN", "CCCN", "CC(=O)O", "CC(=O)N", "c1ccccc1",
        "Cc1ccccc1", "Oc1ccccc1", "Nc1ccccc1", "c1ccncc1", "C1CCCCC1", "C1CCOCC1", "CCCl",
    ];

    fn write_table(path: &std::path::Path, labeled: bool) {
        let mut text = String::from(if labeled { "id,smiles,label\n" } else { "id,smiles\n" });
        for (i, s) in SMILES.iter().enumerate() {
            if labeled {
                text.push_str(&format!("m{i},{s},{}\n", 1.0 + 0.25 * i as f64));
            } else {
                text.push_str(&format!("m{i},{s}\n"));
            }
        }
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("molgap.toml");
        fs::write(
            &config,
            "[fingerprint]\nwidth = 32\n\n[learner]\nbatch_size = 4\nmax_epochs = 2\n\n[selector]\nforest_trees = 5\n",
        )
        .unwrap();
        let (aux, target, eval) = (
            dir.path().join("aux.csv"),
            dir.path().join("target.csv"),
            dir.path().join("eval.csv"),
        );
        write_table(&aux, true);
        write_table(&target, true);
        write_table(&eval, false);
        let out = dir.path().join("out");

        let args = |resume| RunArgs {
            config: Some(config.clone()),
            auxiliary: aux.clone(),
            target: target.clone(),
            evaluation: eval.clone(),
            output_dir: Some(out.clone()),
            resume,
        };
        assert_eq!(handle_run(args(false)), 0);
        assert!(out.join("predictions.csv").exists());
        assert!(out.join("run_summary.json").exists());

        // A second run must not silently replace the checkpoint.
        assert_eq!(handle_run(args(false)), 2);
        assert_eq!(handle_run(args(true)), 0);
    }

    #[test]
    fn test_missing_label_column_exits_1() {
        let dir = tempfile::tempdir().unwrap();
        let unlabeled = dir.path().join("unlabeled.csv");
        write_table(&unlabeled, false);

        let code = handle_run(RunArgs {
            config: None,
            auxiliary: unlabeled.clone(),
            target: unlabeled.clone(),
            evaluation: unlabeled,
            output_dir: Some(dir.path().join("out")),
            resume: false,
        });
        assert_eq!(code, 1);
    }
}
