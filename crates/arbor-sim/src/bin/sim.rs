#![forbid(unsafe_code)]

use anyhow::Result;
use arbor_sim::{SimulationConfig, Simulator};

fn main() -> Result<()> {
    let mut simulator = Simulator::new(SimulationConfig::default())?;
    let result = simulator.run()?;

    println!(
        "simulation complete: trace_events={} observers={} passed={} interesting={}",
        result.trace.len(),
        result.states.len(),
        result.oracle.passed,
        result.interesting_state_reached
    );
    if !result.oracle.passed {
        for violation in &result.oracle.violations {
            println!("  {}", arbor_sim::campaign::format_violation(violation));
        }
        std::process::exit(1);
    }

    Ok(())
}
