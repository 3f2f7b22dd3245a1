use clap::Parser;
use rssi_grapher::app::{self, Options, RealScanner};
use rssi_grapher::render::plotters::PlottersRenderer;
use rssi_grapher::report::{ArtifactViewer, NoopViewer, SystemViewer};
use std::panic::{self, PanicHookInfo};
use tokio_util::sync::CancellationToken;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Pipeline lifecycle violations panic on purpose; make sure they still
    // yield a distinct exit status.
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let renderer = PlottersRenderer::default();
    let viewer: Box<dyn ArtifactViewer> = if options.no_view {
        Box::new(NoopViewer)
    } else {
        Box::new(SystemViewer)
    };

    println!("Scanning... interrupt with Ctrl+C");

    let mut out = std::io::stdout();
    let mut err = std::io::stderr();
    match app::run_with_io(
        options,
        &RealScanner,
        &renderer,
        viewer.as_ref(),
        cancel,
        &mut out,
        &mut err,
    )
    .await
    {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
