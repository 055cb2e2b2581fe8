use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use knee_severity::cli::{self, Args, Command, ServeArgs};
use knee_severity::handlers::{self, AppState};
use knee_severity::Pipeline;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::info;

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let pipeline = Pipeline::load(&args.manifest)
        .with_context(|| format!("loading model from {}", args.manifest.display()))?;
    let state = web::Data::new(AppState::new(Arc::new(pipeline), args.max_upload_bytes));

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(handlers::configure)
    });
    if let Some(workers) = args.workers {
        server = server.workers(workers);
    }

    let server = server
        .bind((args.host.as_str(), args.port))
        .map_err(|e| match e.kind() {
            ErrorKind::AddrInUse => anyhow::anyhow!("Port {} is already in use", args.port),
            _ => anyhow::Error::new(e).context(format!("binding {}:{}", args.host, args.port)),
        })?;

    info!("Server running at http://{}:{}", args.host, args.port);
    server.run().await?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    knee_severity::init_tracing();
    let args = Args::parse();

    match args.command {
        Command::Serve(serve_args) => actix_rt::System::new().block_on(serve(serve_args)),
        Command::Predict(predict_args) => {
            let (json, code) = cli::predict_command(&predict_args, &mut std::io::stdin().lock());
            println!("{json}");
            std::process::exit(code);
        }
    }
}
