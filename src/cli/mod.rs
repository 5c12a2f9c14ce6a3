//! CLI surface for tradelink.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;

use crate::config::{self, Config};
use crate::data::{Generation, StaticTables};
use crate::link::AdapterLink;
use crate::mediator::{SessionConfig, TradeMediator, TradeTarget};
use crate::negotiate::ExchangeMode;
use crate::party::gen3::{Pk3Single, RECORD_LEN, SINGLE_LEN};
use crate::party::Pk3Record;
use crate::relay::RelayClient;
use crate::{Error, Result};

#[derive(Parser, Debug)]
#[command(
    name = "tradelink",
    version,
    about = "Link-cable trade mediator for Game Boy Pokémon cartridges",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Config file (default: tradelink.toml in the working directory).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mediate a trade session.
    Trade(TradeArgs),

    /// Decode and print a saved Gen 3 record file.
    Inspect {
        /// A 100-byte record or a 149-byte single-Pokémon payload.
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct TradeArgs {
    #[command(subcommand)]
    pub target: TradeTargetCommand,

    /// Cartridge generation (overrides the config).
    #[arg(long, value_enum)]
    pub generation: Option<GenerationArg>,
}

#[derive(Subcommand, Debug)]
pub enum TradeTargetCommand {
    /// Trade with a second player through a relay room.
    Link,
    /// Trade against the server-side Pokémon pool.
    Pool {
        /// Deliver the pool Pokémon as an egg (Gen 2).
        #[arg(long)]
        egg: bool,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum GenerationArg {
    Gen1,
    Gen2,
    Gen3,
}

impl From<GenerationArg> for Generation {
    fn from(value: GenerationArg) -> Self {
        match value {
            GenerationArg::Gen1 => Generation::Gen1,
            GenerationArg::Gen2 => Generation::Gen2,
            GenerationArg::Gen3 => Generation::Gen3,
        }
    }
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

pub fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("tradelink.toml"));
    let config = config::load(&config_path)?;

    match cli.command {
        Commands::Trade(args) => run_trade(&config, args),
        Commands::Inspect { file } => run_inspect(&config, &file),
    }
}

fn run_trade(config: &Config, args: TradeArgs) -> Result<()> {
    let generation = args
        .generation
        .map(Generation::from)
        .unwrap_or(config.trade.generation);
    let tables = StaticTables::load(&config.data_root, generation)?;
    if !tables.sanity_enabled() && generation != Generation::Gen3 {
        info!("sanity-check tables missing; validation disabled");
    }

    let (target, egg) = match args.target {
        TradeTargetCommand::Link => (TradeTarget::Link, false),
        TradeTargetCommand::Pool { egg } => (TradeTarget::Pool, egg),
    };

    let device = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&config.link.device)
        .map_err(|e| {
            Error::Config(format!(
                "cannot open adapter {}: {e}",
                config.link.device.display()
            ))
        })?;
    let link = AdapterLink::new(device);
    let relay = RelayClient::connect(config.relay.addr.as_str(), &config.relay.room)?;

    let session = SessionConfig {
        generation,
        target,
        preferred_mode: if config.trade.buffered {
            ExchangeMode::Buffered
        } else {
            ExchangeMode::Synchronous
        },
        egg_trade: egg,
        japanese: config.trade.japanese,
        relay_addr: Some(config.relay.addr.clone()),
        room: config.relay.room.clone(),
    };

    let mut mediator = TradeMediator::new(link, relay, &tables, session)?;
    mediator.run(&mut |mode| {
        info!(%mode, "peer won the mode tiebreak; following");
        true
    })?;
    Ok(())
}

fn run_inspect(config: &Config, file: &std::path::Path) -> Result<()> {
    let raw = fs::read(file)?;
    let record = match raw.len() {
        RECORD_LEN => Pk3Record::from_bytes(&raw).map_err(crate::mediator::TradeError::from)?,
        SINGLE_LEN => {
            Pk3Single::from_bytes(&raw)
                .map_err(crate::mediator::TradeError::from)?
                .record
        }
        other => {
            return Err(Error::Config(format!(
                "expected a {RECORD_LEN}- or {SINGLE_LEN}-byte record, got {other} bytes"
            )))
        }
    };

    let tables = StaticTables::load(&config.data_root, Generation::Gen3).ok();
    let plain = record.decrypt();

    let species_name = tables
        .as_ref()
        .map(|t| t.species_name(plain.display_species()))
        .unwrap_or_else(|| format!("#{:03}", plain.species()));
    let nickname = tables
        .as_ref()
        .map(|t| {
            t.text
                .decode_until(record.nickname(), crate::data::text::TERMINATOR_GBA)
        })
        .unwrap_or_default();
    let ot_name = tables
        .as_ref()
        .map(|t| {
            t.text
                .decode_until(record.ot_name(), crate::data::text::TERMINATOR_GBA)
        })
        .unwrap_or_default();

    println!("species:   {species_name}");
    println!("nickname:  {nickname}");
    println!("ot:        {ot_name} ({:08X})", record.ot_id());
    println!("pid:       {:08X}", plain.pid);
    println!("nature:    {}", plain.nature());
    println!("level:     {}", record.level());
    println!("moves:     {:?}", plain.moves());
    println!("ivs:       {:?}", plain.ivs());
    println!("evs:       {:?}", plain.evs());
    println!("egg:       {}", plain.is_egg());
    println!(
        "checksum:  {} (stored {:04X}, computed {:04X})",
        if plain.checksum_valid() { "ok" } else { "INVALID" },
        plain.stored_checksum,
        plain.computed_checksum()
    );
    Ok(())
}
