use std::{fs, path::PathBuf, time::Instant};

use anyhow::{bail, Context};
use clap::Parser;
use planfix::{
    diagnosis::{Candidate, Component, Diagnoser, DiagnoserConfig, System, TraceSystem},
    lang,
};

/// Diagnoses a faulty planning domain against traces that should be valid,
/// and reports the minimal schema repairs that make them so.
#[derive(Parser)]
#[command(name = "planfix", version, about)]
struct Args {
    /// Path to the domain file
    #[arg(long)]
    domain: PathBuf,
    /// Paths to the task files, zipped positionally with --plans
    #[arg(long, num_args = 1.., required = true)]
    tasks: Vec<PathBuf>,
    /// Paths to the plan files
    #[arg(long, num_args = 1.., required = true)]
    plans: Vec<PathBuf>,
    /// File for writing the diagnosis
    #[arg(long)]
    out_diagnosis: Option<PathBuf>,
    /// File for writing the repaired domain
    #[arg(long)]
    out_domain: Option<PathBuf>,
    /// Print the found diagnosis
    #[arg(long)]
    print: bool,
    /// Print the found diagnosis as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.tasks.len() != args.plans.len() {
        bail!(
            "{} task file(s) but {} plan file(s); they are zipped positionally",
            args.tasks.len(),
            args.plans.len()
        );
    }

    let domain_text = fs::read_to_string(&args.domain)
        .with_context(|| format!("reading domain {}", args.domain.display()))?;
    let mut systems = Vec::with_capacity(args.tasks.len());
    for (task_path, plan_path) in args.tasks.iter().zip(&args.plans) {
        let problem_text = fs::read_to_string(task_path)
            .with_context(|| format!("reading task {}", task_path.display()))?;
        let plan_text = fs::read_to_string(plan_path)
            .with_context(|| format!("reading plan {}", plan_path.display()))?;
        let task = lang::task_from_strs(&domain_text, &problem_text)
            .with_context(|| format!("processing task {}", task_path.display()))?;
        let plan = lang::parse_plan(&plan_text);
        systems.push(
            TraceSystem::new(task, &plan)
                .with_context(|| format!("grounding plan {}", plan_path.display()))?,
        );
    }

    let mut diagnoser = Diagnoser::new(System::new(systems)?, DiagnoserConfig::default());
    let started = Instant::now();
    let diagnosis = diagnoser.diagnose(&Candidate::new())?;
    let elapsed = started.elapsed();

    let mut components: Vec<&Component> = diagnosis.iter().collect();
    components.sort();

    if args.print {
        for comp in &components {
            println!("{}", comp);
        }
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&components)?);
    }
    if let Some(path) = &args.out_diagnosis {
        let mut text = components
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        text.push_str(&format!("\ntime: {}\n", elapsed.as_secs_f64()));
        fs::write(path, text)
            .with_context(|| format!("writing diagnosis to {}", path.display()))?;
    }
    if let Some(path) = &args.out_domain {
        // Folding the diagnosis back into the schema list is a driver-layer
        // concern; the diagnosis core only hands out the components.
        let mut task = diagnoser.system().task().clone();
        for schema in &mut task.actions {
            let mut repaired = schema.clone();
            for comp in &components {
                if comp.action == repaired.name {
                    repaired = comp.apply(&repaired);
                }
            }
            *schema = repaired;
        }
        fs::write(path, task.domain_pddl())
            .with_context(|| format!("writing repaired domain to {}", path.display()))?;
    }

    eprintln!(
        "diagnosis of {} component(s) in {:.3}s",
        components.len(),
        elapsed.as_secs_f64()
    );
    Ok(())
}
