use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;

mod capture;
mod clock;
mod config;
mod dashboard;
mod error;
mod fragment;
mod header;
mod packet;
mod pipeline;
mod process;
mod reaper;
mod stats;
#[cfg(test)]
mod test_support;

use crate::{
    capture::RawCapture,
    clock::MonotonicClock,
    config::Cli,
    error::CaptureError,
    pipeline::{Attribution, Pipeline},
    process::ProcessTable,
    stats::ConnectionStats,
};

const BATCH_LIMIT: usize = 10000;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGTERM,
            signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGINT,
            signal_handler as *const () as libc::sighandler_t,
        );
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.default_log_filter()),
    )
    .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CaptureError> {
    install_signal_handlers();

    let mode = cli.transport_mode();
    log::info!("monitoring {:?} traffic", mode);

    let mut capture = RawCapture::open(cli.interface.as_deref())?;
    let mut pipeline = Pipeline::new(mode, MonotonicClock::new());
    let mut stats = ConnectionStats::new();

    let refresh = cli.refresh_interval();
    let mut last_report = Instant::now();

    while !SHUTDOWN_REQUESTED.load(Ordering::Relaxed) {
        let mut working = false;

        // 一轮最多处理 BATCH_LIMIT 帧，避免刷新被饿死
        for _ in 0..BATCH_LIMIT {
            let Some(frame) = received(capture.recv()) else {
                break;
            };
            working = true;

            match pipeline.process(frame.as_ref(), frame.direction) {
                Attribution::Record(record) => stats.record(&record, frame.as_ref().len()),
                Attribution::Unhandled(reason) => {
                    log::trace!("unhandled frame: {reason}");
                    stats.record_unhandled();
                }
            }
        }

        let elapsed = last_report.elapsed();
        if elapsed >= refresh {
            report(cli, &pipeline, &mut stats, elapsed);
            last_report = Instant::now();
        }

        if !working {
            std::thread::sleep(Duration::from_micros(100));
        }
    }

    log::info!("shutting down");
    Ok(())
}

// 接收出错（ENETDOWN、ENOBUFS 等）只结束本轮，下一轮继续轮询
fn received<T>(result: Result<Option<T>, CaptureError>) -> Option<T> {
    match result {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("{e}");
            None
        }
    }
}

fn report(
    cli: &Cli,
    pipeline: &Pipeline<MonotonicClock>,
    stats: &mut ConnectionStats,
    elapsed: Duration,
) {
    let unhandled = stats.unhandled();
    let connections = stats.snapshot(elapsed);

    let processes = ProcessTable::build(cli.transport_mode());
    log::debug!("{} sockets mapped to processes", processes.socket_count());
    let rows = process::aggregate(&connections, &processes);

    let frame = dashboard::Frame {
        rows: &rows,
        active_reassemblies: pipeline.table().active_count(),
        reassembly_capacity: pipeline.table().capacity(),
        unhandled,
        at: chrono::Local::now(),
    };
    if cli.no_dashboard {
        log::info!("{}", dashboard::summary(&frame));
        return;
    }

    let out = dashboard::render(&frame);

    let mut stdout = io::stdout().lock();
    if let Err(e) = stdout.write_all(out.as_bytes()).and_then(|()| stdout.flush()) {
        log::warn!("failed to draw dashboard: {e}");
    }
}
