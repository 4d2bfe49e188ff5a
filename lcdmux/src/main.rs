use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use lcdmux::{Command, Config, Subsystem};
use lcdmux_gpio::GpioDriver;
use lcdmux_gpio::gpiod::GpiodDriver;
use lcdmux_gpio::raw::RawGpioDriver;
use log::{debug, info};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Backend {
    /// BCM283x registers through /dev/gpiomem
    Gpiomem,
    /// BCM283x registers through /dev/mem, needs root
    Mem,
    /// Linux GPIO character device
    Gpiod,
}

#[derive(Debug, Parser)]
#[command(version, about = "Drive a shared HD44780 display")]
struct Args {
    /// Device to open
    #[arg(short, long, default_value_t = 0)]
    device: usize,

    #[arg(short, long, value_enum, default_value_t = Backend::Gpiomem)]
    backend: Backend,

    /// GPIO chip, for the gpiod backend
    #[arg(long, default_value = "/dev/gpiochip0")]
    chip: PathBuf,

    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Clear the display
    Clear,
    /// Show text, wrapping to the second line
    Write { text: String },
    /// Shift the display left
    ShiftLeft { count: u32 },
    /// Shift the display right
    ShiftRight { count: u32 },
}

fn open_driver(args: &Args) -> eyre::Result<Box<dyn GpioDriver>> {
    Ok(match args.backend {
        Backend::Gpiomem => Box::new(RawGpioDriver::new_gpiomem()?),
        Backend::Mem => Box::new(RawGpioDriver::new_mem()?),
        Backend::Gpiod => Box::new(GpiodDriver::open(&args.chip)?),
    })
}

fn run(subsystem: &Subsystem, args: &Args) -> eyre::Result<()> {
    let mut session = subsystem.open(args.device)?;

    let command = match &args.action {
        Action::Write { text } => {
            let written = session.write(text.as_bytes())?;
            info!("Wrote {} bytes to device {}", written, session.index());
            None
        }
        Action::Clear => Some(Command::Clear),
        Action::ShiftLeft { count } => Some(Command::ShiftLeft(*count)),
        Action::ShiftRight { count } => Some(Command::ShiftRight(*count)),
    };

    if let Some(command) = command {
        let (code, param) = command.to_ioctl();
        session.ioctl(code, param)?;
        info!("Device {}: {:?} done (ioctl {:#x})", session.index(), command, code);
    }

    session.close();
    Ok(())
}

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    let args = Args::parse();
    info!("lcdmux starting...");

    let config = Config::load()?;
    debug!("{:?}", config);

    debug!("Initializing GPIO driver...");
    let gpio = open_driver(&args)?;
    debug!("{:?} initialized.", gpio);

    let subsystem = Subsystem::new(&*gpio, &config)?;
    let result = run(&subsystem, &args);
    subsystem.shutdown();

    result
}
