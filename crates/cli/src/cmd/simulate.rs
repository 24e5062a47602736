//! Run a proxy session against a simulated debuggee
//!
//! Breakpoints are set through the proxy on an in-memory backend. A simulated
//! agent then captures or deletes them at random while the proxy long-polls,
//! and every hit is printed as it is reported.

use crate::system_config::{SimulateConfig, SystemConfig};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use proxy::{DebugProxy, HitState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stakeout_core::{
    Breakpoint, BreakpointRequest, Debuggee, LogLevel, MemoryBackend, SourceLocation, StackFrame, Variable,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const PROJECT_ID: &str = "simulated-project";
const DEBUGGEE_ID: &str = "simulated-debuggee";

pub struct SimulateArgs {
    pub locations: Vec<String>,
    pub log_format: Option<String>,
    pub seed: Option<u64>,
    pub timeout: Duration,
}

pub async fn run(config: &SystemConfig, args: SimulateArgs) -> Result<()> {
    let requests = args
        .locations
        .iter()
        .map(|input| build_request(input, args.log_format.as_deref()))
        .collect::<Result<Vec<_>>>()?;

    let backend = Arc::new(
        MemoryBackend::new()
            .with_project(PROJECT_ID)
            .with_poll_timeout(Duration::from_millis(config.simulate.poll_timeout_ms)),
    );
    backend.add_debuggee(
        Debuggee::new(DEBUGGEE_ID, PROJECT_ID, "1.0.0").with_description("simulated agent"),
    );

    let proxy = DebugProxy::from_config(backend.clone(), &config.proxy)?;
    let project_id = match proxy.project_id() {
        Ok(project_id) => project_id,
        Err(_) => proxy.authorize(None).await.context("Authorization failed")?,
    };

    let debuggee_id = match proxy.debuggee_id() {
        Ok(debuggee_id) => debuggee_id,
        Err(_) => {
            let debuggees = proxy.debuggees().await?;
            let first = debuggees
                .first()
                .with_context(|| format!("No debuggees registered in project {}", project_id))?;
            proxy.select_debuggee(&first.id).await?;
            first.id.clone()
        }
    };
    println!(
        "{} {} {}",
        "Debuggee".bold(),
        debuggee_id.cyan(),
        format!("(project {})", project_id).dimmed()
    );

    let mut ids = Vec::with_capacity(requests.len());
    for request in &requests {
        let bp = proxy.set_breakpoint(request).await?;
        println!("  {} {} at {}", "set".green(), bp.id.dimmed(), bp.location);
        ids.push(bp.id);
    }

    let agent = tokio::spawn(run_agent(
        backend.clone(),
        debuggee_id.clone(),
        ids,
        config.simulate.clone(),
        args.seed,
    ));

    let outcome = tokio::time::timeout(args.timeout, watch(&proxy)).await;
    agent.abort();

    match outcome {
        Ok(result) => result?,
        Err(_) => println!(
            "{}",
            format!("Timed out after {}s with breakpoints still pending", args.timeout.as_secs()).yellow()
        ),
    }

    let hit = proxy.breakpoints(HitState::Hit).len();
    let removed = proxy.remove_all_breakpoints().await?;
    println!(
        "\n{} {} hit, {} removed on exit",
        "Done:".bold(),
        hit.to_string().green(),
        removed
    );
    Ok(())
}

/// Long-poll until no owned breakpoint is pending
async fn watch(proxy: &DebugProxy) -> Result<()> {
    let mut events = proxy.subscribe();
    let mut printed = HashSet::new();

    while !proxy.breakpoints(HitState::Pending).is_empty() {
        let report = proxy.update_pending_breakpoints(true).await?;
        debug!(
            "Pass: {} pending, {} hit, {} evicted, {} retries",
            report.pending.len(),
            report.hit.len(),
            report.evicted.len(),
            report.retries
        );

        for id in &report.evicted {
            println!("  {} {}", "removed elsewhere".yellow(), id.dimmed());
        }

        if events.try_recv().is_ok() {
            for bp in proxy.breakpoints(HitState::Hit) {
                if printed.insert(bp.id.clone()) {
                    print_hit(&bp);
                }
            }
        }
    }
    Ok(())
}

fn print_hit(bp: &Breakpoint) {
    println!("  {} {} at {}", "hit".green().bold(), bp.id.dimmed(), bp.location);
    if let Some(format) = &bp.log_message_format {
        println!("    {} {}", "log".cyan(), format);
    }
    for frame in &bp.stack_frames {
        println!("    {} {}", frame.function.cyan(), frame.location.to_string().dimmed());
        for local in &frame.locals {
            println!(
                "      {} = {}",
                local.name.as_deref().unwrap_or("?"),
                local.value.as_deref().unwrap_or("")
            );
        }
    }
}

/// Parse `path:line` or `path:line:column`
pub fn parse_location(input: &str) -> Result<SourceLocation> {
    let mut parts = input.rsplitn(3, ':').collect::<Vec<_>>();
    parts.reverse();

    let number = |s: &str| -> Result<u32> {
        s.parse()
            .with_context(|| format!("Invalid location '{}': '{}' is not a number", input, s))
    };

    let location = match parts.as_slice() {
        [path, line, column] if column.parse::<u32>().is_ok() && line.parse::<u32>().is_ok() => {
            SourceLocation::new(*path, number(*line)?).with_column(number(*column)?)
        }
        [path, line, last] => SourceLocation::new(format!("{}:{}", path, line), number(*last)?),
        [path, line] => SourceLocation::new(*path, number(*line)?),
        _ => anyhow::bail!("Invalid location '{}': expected path:line", input),
    };

    if location.path.is_empty() {
        anyhow::bail!("Invalid location '{}': empty path", input);
    }
    Ok(location)
}

fn build_request(input: &str, log_format: Option<&str>) -> Result<BreakpointRequest> {
    let location = parse_location(input)?;
    Ok(match log_format {
        Some(format) => BreakpointRequest::logpoint(location, format, LogLevel::Info),
        None => BreakpointRequest::snapshot(location),
    })
}

/// Agent side: capture or delete each breakpoint in turn
async fn run_agent(
    backend: Arc<MemoryBackend>,
    debuggee_id: String,
    mut ids: Vec<String>,
    settings: SimulateConfig,
    seed: Option<u64>,
) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let delay = Duration::from_millis(settings.agent_delay_ms);

    while !ids.is_empty() {
        tokio::time::sleep(delay).await;
        let id = ids.swap_remove(rng.gen_range(0..ids.len()));

        if rng.gen_bool(settings.hit_probability) {
            let Some(bp) = backend.peek(&debuggee_id, &id) else {
                continue;
            };
            let frames = vec![StackFrame {
                function: "handleRequest".to_string(),
                location: bp.location.clone(),
                arguments: Vec::new(),
                locals: vec![Variable {
                    name: Some("requestId".to_string()),
                    value: Some(rng.gen_range(1000..10_000u32).to_string()),
                    type_name: Some("number".to_string()),
                    ..Variable::default()
                }],
            }];
            backend.capture(&debuggee_id, &id, frames);
            info!("Agent captured {}", id);
        } else {
            backend.delete_external(&debuggee_id, &id);
            info!("Agent deleted {}", id);
        }
    }
}
