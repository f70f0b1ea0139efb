//! RPC Gateway - multi-tenant gateway with certificate identity and
//! scope-based authorization.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use rpc_gateway::{
    cli::{Cli, Command},
    client::ClientRegistry,
    config::{Config, ProviderConfig},
    gateway::{Authorizer, Decision, Gateway},
    mtls::{Identity, extract_identity, load_certs, serial_from_der},
    service::ServiceKind,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command.take() {
        Some(Command::Identity { certs }) => run_identity(&certs),
        Some(Command::CheckConfig) => run_check_config(cli.config.as_deref()),
        Some(Command::Authorize { method, identity }) => {
            run_authorize(cli.config.as_deref(), &method, identity.as_deref())
        }
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Print the canonical identity of every certificate in the given files.
fn run_identity(paths: &[impl AsRef<Path>]) -> ExitCode {
    let mut failed = false;
    for path in paths {
        let path = path.as_ref();
        let certs = match load_certs(path) {
            Ok(certs) => certs,
            Err(e) => {
                eprintln!("❌ {}: {e}", path.display());
                failed = true;
                continue;
            }
        };
        for cert in &certs {
            match serial_from_der(cert.as_ref()) {
                Ok(serial) => println!("{}\t{}", extract_identity(&serial), path.display()),
                Err(e) => {
                    eprintln!("❌ {}: {e}", path.display());
                    failed = true;
                }
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Load, validate and summarise the configuration.
fn run_check_config(path: Option<&Path>) -> ExitCode {
    let config = match Config::load(path).and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    let clients = match ClientRegistry::from_config(&config.clients) {
        Ok(clients) => clients,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("✅ Configuration valid");
    println!(
        "   Listen: {}:{} ({})",
        config.server.host,
        config.server.port,
        if config.mtls.enabled { "mTLS" } else { "plain TCP" }
    );
    println!("   Clients: {}", clients.len());
    for client in clients.iter() {
        let scopes: Vec<&str> = client.scopes.iter().map(|s| s.as_str()).collect();
        println!("     {:<24} [{}]", client.identity, scopes.join(", "));
    }
    if config.payments.enabled {
        let kind = match &config.payments.provider {
            ProviderConfig::Stripe(_) => "stripe",
            ProviderConfig::Sandbox(_) => "sandbox",
        };
        println!("   Payments: {kind}");
    } else {
        println!("   Payments: disabled");
    }
    ExitCode::SUCCESS
}

/// Dry-run a decision as if every service were bound.
fn run_authorize(config_path: Option<&Path>, method: &str, identity: Option<&str>) -> ExitCode {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    let built = ClientRegistry::from_config(&config.clients).and_then(|clients| {
        Authorizer::new(ServiceKind::ALL.map(ServiceKind::descriptor))
            .map(|authorizer| (clients, authorizer))
    });
    let (clients, authorizer) = match built {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let client = match identity.map(Identity::parse).transpose() {
        Ok(Some(identity)) => {
            let found = clients.lookup(&identity);
            if found.is_none() {
                println!("⚠️  {identity} is not a configured client, deciding as anonymous");
            }
            found
        }
        Ok(None) => None,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("   Class: {:?}", authorizer.classify(method));
    match authorizer.authorize(method, client.map(|c| c.as_ref())) {
        Decision::Allow => {
            println!("✅ ALLOW {method}");
            ExitCode::SUCCESS
        }
        Decision::Deny(reason) => {
            println!("❌ DENY {method}: {reason}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(cli: Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    // Both reqwest and the TLS listener pick up the process-wide provider.
    rpc_gateway::install_crypto_provider();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        clients = config.clients.len(),
        mtls = config.mtls.enabled,
        "Starting RPC Gateway"
    );

    let gateway = match Gateway::from_config(&config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.serve(&config.server, &config.mtls).await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
