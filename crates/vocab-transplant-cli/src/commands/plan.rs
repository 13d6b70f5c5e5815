//! Plan command: print the mapping of every target token without loading or
//! writing weights.
//!
//! Output is one `id<TAB>text<TAB>ids` line per target id on stdout, followed
//! by the mapping-length histogram.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;

use vocab_transplant::{plan_transplant, TransplantPlan};

use super::MappingArgs;
use crate::error::{report_error, CliError, CliExitCode};

/// Arguments for the plan command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Donor model directory (config.json, tokenizer)
    pub donor_dir: PathBuf,

    /// Target model directory (config.json, tokenizer)
    pub target_dir: PathBuf,

    #[command(flatten)]
    pub mapping: MappingArgs,
}

pub fn handle_plan(args: PlanArgs) -> i32 {
    match run(&args) {
        Ok(()) => CliExitCode::Success.into(),
        Err(e) => report_error(&e),
    }
}

fn run(args: &PlanArgs) -> Result<(), CliError> {
    let config = args.mapping.load_config()?;
    config.validate().map_err(CliError::Config)?;

    let plan = plan_transplant(&args.donor_dir, &args.target_dir, &config)?;
    let stdout = std::io::stdout();
    write_plan(&plan, &mut stdout.lock())?;
    Ok(())
}

fn write_plan(plan: &TransplantPlan, out: &mut impl Write) -> std::io::Result<()> {
    for mapped in &plan.mappings {
        writeln!(
            out,
            "{}\t{:?}\t{:?}",
            mapped.target_id,
            mapped.text,
            mapped.mapping.ids()
        )?;
    }

    let used = plan.stats.used_size.max(1) as f64;
    writeln!(out)?;
    for (count, occurrences) in &plan.stats.mapping_counts {
        writeln!(
            out,
            "{} to 1\t{}\t{:.2}%",
            count,
            occurrences,
            *occurrences as f64 / used * 100.0
        )?;
    }
    writeln!(
        out,
        "used {} of {} declared",
        plan.stats.used_size, plan.stats.declared_size
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vocab_transplant::{Mapping, MappedToken, MappingSource, TransplantStats};

    #[test]
    fn test_write_plan_format() {
        let mappings = vec![
            MappedToken {
                target_id: 0,
                text: "a".to_string(),
                mapping: Mapping::single(0),
                source: MappingSource::Reencoded,
            },
            MappedToken {
                target_id: 1,
                text: "c\n".to_string(),
                mapping: Mapping::new(vec![0, 1]).unwrap(),
                source: MappingSource::Override,
            },
        ];
        let mut stats = TransplantStats::new(2, 4);
        for m in &mappings {
            stats.record_mapping(&m.mapping);
        }
        let plan = TransplantPlan {
            mappings,
            alignment: Vec::new(),
            stats,
        };

        let mut buf = Vec::new();
        write_plan(&plan, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "0\t\"a\"\t[0]");
        assert_eq!(lines[1], "1\t\"c\\n\"\t[0, 1]");
        assert!(text.contains("1 to 1\t1\t50.00%"));
        assert!(text.contains("2 to 1\t1\t50.00%"));
        assert!(text.ends_with("used 2 of 4 declared\n"));
    }
}
