//! Shipway Agent - 镜像发布代理
//!
//! Supports running as:
//! - HTTP agent (default)
//! - One-shot pipeline runner (with `run` subcommand)
//!
//! Usage:
//! - Agent mode: `shipway-agent`
//! - With custom port: `shipway-agent --port 9411`
//! - One-shot release: `shipway-agent run <pipeline>`

use shipway_agent::RuntimeConfig;

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "run" => {
                // run 子命令由 main 处理
                break;
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("Shipway Agent - 镜像发布代理");
    println!();
    println!("USAGE:");
    println!("    shipway-agent [OPTIONS] [COMMAND]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port");
    println!("    -h, --help       Print help information");
    println!();
    println!("COMMANDS:");
    println!("    run <pipeline>   Execute one pipeline in the foreground and exit");
    println!();
    println!("EXAMPLES:");
    println!("    shipway-agent                 # Agent mode");
    println!("    shipway-agent --port 9411     # Custom port");
    println!("    shipway-agent run webtest     # One-shot release");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // One-shot pipeline run
    if args.len() >= 2 && args[1] == "run" {
        handle_run_command(&args);
        return;
    }

    // Parse runtime config from command line
    let config = parse_args();

    // Agent mode - run with tokio runtime
    let rt = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    rt.block_on(async {
        shipway_agent::init_and_run_agent_with_config(config).await;
    });
}

/// Handle the `run` subcommand
fn handle_run_command(args: &[String]) {
    if args.len() < 3 {
        println!("Usage: shipway-agent run <pipeline>");
        println!();
        println!("Pipelines are defined via PIPELINE_<NAME>_IMAGE environment variables.");
        return;
    }

    let pipeline = &args[2];
    let rt = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let exit_code = rt.block_on(async { shipway_agent::run_pipeline_once(pipeline).await });

    std::process::exit(if exit_code == 0 { 0 } else { 1 });
}
