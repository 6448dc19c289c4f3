use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use telsim_channel::{Channel, MemoryBus, SimRig};
use telsim_core::aoloop::LOOP_OPEN;
use telsim_core::rig::sim_axes;
use telsim_core::{
    doctor, Clock, Confirm, ConfirmOutcome, FixedConfirm, IntentLatches, LoopControl, MoveForm, RigChannels,
    Sequencer, SystemClock, TelsimConfig,
};
use telsim_proto::status::EventKind;

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

mod operator;

use operator::{interrupt, parse_line, Console, ConsoleConfirm, OperatorCmd};

#[derive(Debug, Parser)]
#[command(name = "telsim", version, about = "Telescope simulator move controller")]
struct Cli {
    /// TOML config; built-in rig defaults when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Force debug logging.
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and exit.
    Doctor,
    /// Drive the sequencer against the built-in rig simulator.
    Run {
        /// Confirm every move without asking.
        #[arg(long)]
        assume_yes: bool,
        /// Stop after this many control ticks.
        #[arg(long)]
        ticks: Option<u64>,
    },
}

fn load_config(path: Option<&str>) -> Result<TelsimConfig> {
    let Some(path) = path else { return Ok(TelsimConfig::default()) };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Doctor => run_doctor(&cfg)?,
        Command::Run { assume_yes, ticks } => run(cfg, assume_yes, ticks).await?,
    }
    Ok(())
}

fn run_doctor(cfg: &TelsimConfig) -> Result<()> {
    info!("doctor: starting");
    doctor::check_config(cfg)?;
    info!("doctor: {} channels configured", cfg.channels.all().len());
    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: TelsimConfig, assume_yes: bool, ticks: Option<u64>) -> Result<()> {
    doctor::check_config(&cfg).context("config rejected")?;
    info!("run: starting against the in-memory rig");

    let bus = MemoryBus::new();
    let names = &cfg.channels;
    let (alt, wind) = sim_axes(names, &cfg.sim);
    let sim = SimRig::new(bus.clone(), vec![alt.clone(), wind.clone()]);
    sim.park(&alt, cfg.sim.initial_alt);
    sim.park(&wind, cfg.sim.initial_wind);
    bus.post(&names.wind_vel, cfg.home.velocity);
    bus.post(&names.wind_accel, cfg.home.acceleration);
    bus.post(&names.dt_loop, LOOP_OPEN);
    bus.post(&names.dm_loop, LOOP_OPEN);
    bus.post(&names.gain, cfg.sim.initial_gain);
    bus.post(&names.frame_rate, cfg.sim.initial_frame_rate.to_string().as_str());

    let rig = RigChannels::connect(names, |n| Arc::new(bus.channel(n)) as Arc<dyn Channel>);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let latches = Arc::new(IntentLatches::new());
    let form = Arc::new(Mutex::new(MoveForm::new(
        cfg.sim.initial_wind,
        cfg.home.velocity,
        cfg.home.acceleration,
        cfg.sim.initial_alt,
    )));

    let shutdown = Arc::new(AtomicBool::new(false));
    let (answer_tx, answer_rx) = mpsc::unbounded_channel::<ConfirmOutcome>();
    let confirm: Box<dyn Confirm> = if assume_yes {
        Box::new(FixedConfirm(ConfirmOutcome::Proceed))
    } else {
        Box::new(ConsoleConfirm { answers: answer_rx, shutdown: shutdown.clone() })
    };

    let mut seq = Sequencer::new(
        cfg.sequencer.clone(),
        cfg.home.clone(),
        rig.clone(),
        form.clone(),
        latches.clone(),
        clock.clone(),
        confirm,
    );
    let mut console = Console::new(
        rig.clone(),
        form.clone(),
        LoopControl::new(&rig, clock.clone()),
        cfg.sim.initial_frame_rate,
    );

    {
        let shutdown = shutdown.clone();
        let answers = answer_tx.downgrade();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("run: interrupted");
                interrupt(&shutdown, &answers);
            }
        });
    }

    // Button presses go straight to the latches; everything else is applied
    // between ticks on the control thread. A plain thread, so a pending read
    // never holds up runtime shutdown.
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<OperatorCmd>();
    {
        let shutdown = shutdown.clone();
        let latches = latches.clone();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("console read failed: {}", e);
                        break;
                    }
                };
                match parse_line(&line) {
                    Ok(Some(OperatorCmd::Press(intent))) => latches.press(intent),
                    Ok(Some(OperatorCmd::Answer(answer))) => {
                        let _ = answer_tx.send(answer);
                    }
                    Ok(Some(OperatorCmd::Quit)) => {
                        shutdown.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(Some(cmd)) => {
                        if cmd_tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{:#}", e),
                }
            }
        });
    }

    let period = Duration::from_millis(cfg.sequencer.poll_ms);
    let control = tokio::task::spawn_blocking(move || -> Result<String> {
        let mut last_state = String::new();
        let mut n: u64 = 0;

        while !shutdown.load(Ordering::SeqCst) {
            let started = Instant::now();

            while let Ok(cmd) = cmd_rx.try_recv() {
                console.apply(cmd, &seq)?;
            }

            let state = seq.tick().to_string();
            sim.step(period.as_secs_f64());

            if state != last_state {
                let kind = if seq.state().is_fault() { EventKind::Fault } else { EventKind::Transition };
                println!("{}", serde_json::to_string(&seq.status().event(kind))?);
                last_state = state;
            }

            n += 1;
            if ticks.is_some_and(|max| n >= max) {
                info!("run: {} ticks done", n);
                break;
            }
            if let Some(rest) = period.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        Ok(last_state)
    });

    let final_state = control.await.context("control loop panicked")??;
    info!("run: stopped in {}", final_state);
    Ok(())
}
