use anyhow::*;
use clap::Parser;
use mrlite_local::standalone::{init_logging, read_input, write_output, Args, Job};
use mrlite_local::*;
use tracing::info;

fn run_standalone_mr_job(job: Job, engine: Workload) -> Result<()> {
    let config = job.engine_config()?;
    let aux = job.aux()?;
    let input = read_input(&job.input)?;
    info!(records = input.len(), pattern = %job.input, "loaded input");

    let mut mr = MapReduce::new(config)?;
    let output = mr.run(
        &input,
        |kv, emit| (engine.map_fn)(kv, &aux, emit),
        job.map_workers,
        |group, emit| (engine.reduce_fn)(group, &aux, emit),
        job.reduce_workers,
    )?;

    let path = write_output(&job.output, &output)?;
    info!(records = output.len(), path = %path.display(), "wrote output");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let job = Job::from(args.command);
    let engine = workload::named(&job.workload)?;

    run_standalone_mr_job(job, engine)
}
