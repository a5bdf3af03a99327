use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use narrata::services::{Button, LogDiagnostics, TypewriterWriter, Ui};
use narrata::{Config, Program, Scheduler, Services, VariableEvaluator, Waiting};

/// Prints what a graphical host would draw.
struct ConsoleUi;

impl Ui for ConsoleUi {
  fn write_text(&mut self, layer: &str, text: &str, _instant: bool) {
    if !text.is_empty() {
      info!("[{layer}] {text}");
    }
  }

  fn write_image(&mut self, layer: &str, image: &str, _instant: bool) {
    info!("[{layer}] <{image}>");
  }

  fn clear_text(&mut self, _preserve: &[String]) {}

  fn clear_images(&mut self, _preserve: &[String]) {}

  fn clear_layer(&mut self, _layer: &str) {}

  fn show_choices(&mut self, buttons: &[Button]) {
    for button in buttons {
      info!("  ({}) {}", button.id, button.text);
    }
  }

  fn hide_choices(&mut self) {}

  fn spawn(&mut self, entity: &str) {
    info!("+ {entity}");
  }

  fn destroy(&mut self, entity: &str) {
    info!("- {entity}");
  }

  fn trigger_all(&mut self) {}
}

struct ConsoleAudio;

impl narrata::services::Audio for ConsoleAudio {
  fn queue(&mut self, channel: &str, asset: &str) {
    info!("[{channel}] play {asset}");
  }

  fn stop_channel(&mut self, _channel: &str) {}

  fn trigger_all(&mut self) {}
}

#[derive(Parser)]
#[command(name = "narrata")]
#[command(about = "Plays a compiled narrative program on the console", long_about = None)]
struct Args {
  /// Compiled program image (JSON)
  program: PathBuf,

  /// Timing and layout overrides (JSON)
  #[arg(long)]
  config: Option<PathBuf>,

  /// Frames to run before giving up on a story that never finishes
  #[arg(long, default_value = "1000000")]
  max_frames: u64,
}

fn load(args: &Args) -> Result<(Program, Config), narrata::LoadError> {
  let config = match &args.config {
    Some(path) => Config::load(path)?,
    None => Config::default(),
  };
  Ok((Program::load(&args.program)?, config))
}

fn main() {
  pretty_env_logger::init();
  let args = Args::parse();
  let (program, config) = match load(&args) {
    Ok(loaded) => loaded,
    Err(err) => {
      error!("{err}");
      exit(1);
    }
  };
  let services = Services {
    ui: Box::new(ConsoleUi),
    audio: Box::new(ConsoleAudio),
    writer: Box::new(TypewriterWriter {
      letter_delay_seconds: config.letter_delay_seconds,
    }),
    diagnostics: Box::new(LogDiagnostics),
  };
  let frame_ms = config.frame_ms();
  let frame_rate = config.frame_rate.max(1);
  let mut scheduler = Scheduler::new(program, Box::new(VariableEvaluator::new()), services, config);
  scheduler.start();
  for _ in 0..args.max_frames {
    scheduler.tick(frame_ms);
    if scheduler.is_ended() || scheduler.is_finished() {
      break;
    }
    for waiting in scheduler.waiting() {
      match waiting {
        Waiting::Press => scheduler.press(),
        Waiting::Choice(buttons) => {
          if let Some(button) = buttons.first() {
            info!("> {}", button.text);
            scheduler.click(&button.id);
          }
        }
        _ => {}
      }
    }
    ::std::thread::sleep(Duration::new(0, 1_000_000_000u32 / frame_rate));
  }
  let chosen: Vec<&str> = scheduler
    .logic()
    .state
    .choices
    .iter()
    .map(|choice| choice.choice_id.as_str())
    .collect();
  info!("finished; choices: {chosen:?}");
}
