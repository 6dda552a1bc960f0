//! Runnable demo server: builds one `ObjectDictionary`, populates it with
//! a handful of sample parameters and an event, then serves it on three
//! listeners (CLI request/response, CLI publish/subscribe, SCGI) bound
//! side by side on a single-threaded executor, matching the "single
//! serial strand" execution model that lets the dictionary stay `Rc`-
//! based instead of `Arc`/`Mutex`-based.

mod config;

use std::rc::Rc;

use clap::Parser;
use decof_cli::{ClisrvContext, PubSubContext};
use decof_core::{Node, ObjectDictionary, Parameter, TimerKind, Userlevel};
use decof_scgi::ScgiContext;
use tokio::net::TcpListener;
use tokio::task::LocalSet;

use config::AppConfig;

#[derive(Parser, Debug)]
struct Args {
    /// Path to a TOML config file; falls back to built-in defaults when
    /// omitted or unreadable.
    #[clap(long)]
    config: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load_from_file(path).unwrap_or_else(|err| {
            log::warn!("failed to load config from {path}: {err}, using defaults");
            AppConfig::default()
        }),
        None => AppConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");
    let local = LocalSet::new();
    local.block_on(&runtime, run(config));
}

async fn run(config: AppConfig) {
    let dictionary = ObjectDictionary::with_separator(config.root_name.clone(), config.separator);
    populate(&dictionary);

    log::info!(
        "decof demo: clisrv=:{} pubsub=:{} scgi=:{}",
        config.ports.clisrv,
        config.ports.pubsub,
        config.ports.scgi
    );

    tokio::task::spawn_local(serve_clisrv(dictionary.clone(), config.ports.clisrv));
    tokio::task::spawn_local(serve_pubsub(dictionary.clone(), config.ports.pubsub));
    tokio::task::spawn_local(serve_scgi(dictionary.clone(), config.ports.scgi));
    tokio::task::spawn_local(drive_timers(dictionary, config.timers));

    std::future::pending::<()>().await;
}

async fn serve_clisrv(dictionary: Rc<ObjectDictionary>, port: u16) {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind CLI request/response port {port}: {err}"));
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::warn!("clisrv accept failed: {err}");
                continue;
            }
        };
        log::debug!("clisrv connection from {peer}");
        let ctx = ClisrvContext::new(dictionary.clone());
        tokio::task::spawn_local(ctx.run(stream));
    }
}

async fn serve_pubsub(dictionary: Rc<ObjectDictionary>, port: u16) {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind CLI publish/subscribe port {port}: {err}"));
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::warn!("pubsub accept failed: {err}");
                continue;
            }
        };
        log::debug!("pubsub connection from {peer}");
        let ctx = PubSubContext::new(dictionary.clone());
        tokio::task::spawn_local(ctx.run(stream));
    }
}

async fn serve_scgi(dictionary: Rc<ObjectDictionary>, port: u16) {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind SCGI port {port}: {err}"));
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::warn!("scgi accept failed: {err}");
                continue;
            }
        };
        log::debug!("scgi connection from {peer}");
        let ctx = ScgiContext::new(dictionary.clone());
        tokio::task::spawn_local(ctx.run(stream));
    }
}

async fn drive_timers(dictionary: Rc<ObjectDictionary>, timers: config::TimersConfig) {
    let mut fast = tokio::time::interval(std::time::Duration::from_millis(timers.fast_ms));
    let mut medium = tokio::time::interval(std::time::Duration::from_millis(timers.medium_ms));
    let mut slow = tokio::time::interval(std::time::Duration::from_millis(timers.slow_ms));
    loop {
        tokio::select! {
            _ = fast.tick() => dictionary.tick(TimerKind::Fast),
            _ = medium.tick() => dictionary.tick(TimerKind::Medium),
            _ = slow.tick() => dictionary.tick(TimerKind::Slow),
        }
    }
}

/// Wires up a small tree exercising every parameter mode and value shape
/// the framework supports, so a fresh client can immediately browse,
/// read, write and subscribe to something.
fn populate(dictionary: &Rc<ObjectDictionary>) {
    let scalars = Node::new("scalars");
    dictionary.root().add_child(scalars.as_dyn()).unwrap();

    let counter = Parameter::managed_rw(
        "counter",
        Userlevel::Normal,
        Userlevel::Normal,
        0i64,
        None,
    );
    scalars.add_child(counter.as_dyn()).unwrap();

    let message = Parameter::managed_rw(
        "message",
        Userlevel::Normal,
        Userlevel::Normal,
        "hello".to_string(),
        None,
    );
    scalars.add_child(message.as_dyn()).unwrap();

    let gain = Parameter::managed_rw(
        "gain",
        Userlevel::Normal,
        Userlevel::Normal,
        1.0f64,
        Some(Box::new(|value: &f64| {
            if *value <= 0.0 {
                decof_core::error::InvalidValueSnafu {
                    reason: "gain must be positive".to_string(),
                }
                .fail()
            } else {
                Ok(())
            }
        })),
    );
    scalars.add_child(gain.as_dyn()).unwrap();

    let serial = Parameter::managed_ro("serial", Userlevel::Readonly, "SN-0001".to_string());
    scalars.add_child(serial.as_dyn()).unwrap();

    let clock_tick = std::rc::Rc::new(std::cell::Cell::new(0i64));
    let tick_for_getter = clock_tick.clone();
    let timers = dictionary.timers();
    let uptime = Parameter::external_ro(
        "uptime",
        Userlevel::Normal,
        timers,
        TimerKind::Slow,
        move || tick_for_getter.get(),
        0,
    );
    scalars.add_child(uptime.as_dyn()).unwrap();
    tokio::task::spawn_local(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            interval.tick().await;
            clock_tick.set(clock_tick.get() + 1);
        }
    });

    let sequences = Node::new("sequences");
    dictionary.root().add_child(sequences.as_dyn()).unwrap();

    let samples = Parameter::managed_rw(
        "samples",
        Userlevel::Normal,
        Userlevel::Normal,
        vec![0.0f64, 0.0, 0.0],
        None,
    );
    sequences.add_child(samples.as_dyn()).unwrap();

    let flags = Parameter::managed_rw(
        "flags",
        Userlevel::Normal,
        Userlevel::Normal,
        vec![false, true, false],
        None,
    );
    sequences.add_child(flags.as_dyn()).unwrap();

    let tags = Parameter::managed_rw(
        "tags",
        Userlevel::Normal,
        Userlevel::Normal,
        vec!["a".to_string(), "b".to_string()],
        None,
    );
    sequences.add_child(tags.as_dyn()).unwrap();

    let point = Parameter::managed_rw(
        "point",
        Userlevel::Normal,
        Userlevel::Normal,
        decof_core::TupleValue(vec![
            decof_value::Value::Real(0.0),
            decof_value::Value::Real(0.0),
        ]),
        None,
    );
    sequences.add_child(point.as_dyn()).unwrap();

    let reset = decof_core::Event::new("reset", Userlevel::Normal);
    let reset_counter = counter.clone();
    reset.set_handler(move || {
        reset_counter.set(0);
        Ok(())
    });
    dictionary.root().add_child(reset.as_dyn()).unwrap();
}
