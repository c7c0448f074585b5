use clap::Parser;
use tracing::{error, info};
use warden::cli::{
    Args, build_config, handle_create_admin, init_logging, load_key_material, open_database,
    print_keypair,
};
use warden::{init_cleanup, run_server};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    if args.print_keypair {
        let ok = print_keypair();
        std::process::exit(if ok { 0 } else { 1 });
    }

    let Some(keys) = load_key_material(&args) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if let Some(email) = &args.create_admin {
        if !handle_create_admin(&db, email).await {
            std::process::exit(1);
        }
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let config = build_config(&args, db, keys);
    init_cleanup(&config).await;

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, issuer = %config.issuer, "Listening"),
        Err(_) => info!(address = %addr, issuer = %config.issuer, "Listening"),
    }

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
