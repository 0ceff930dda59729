//! Command line and stdin command parsing.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

pub const USAGE: &str = "Usage: charter [SYMBOL] [TIMEFRAME] [--config PATH]

Commands on stdin:
  select <symbol> <timeframe>   switch series (timeframes: 1m 5m 15m 1h 4h)
  scroll <leading_index>        report the viewport's oldest visible bar index
  resync                        reload the latest page
  quit                          exit";

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub config: Option<PathBuf>,
    pub help: bool,
}

impl Args {
    /// Parse arguments, excluding the program name.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Args::default();
        let mut positional = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--help" | "-h" => parsed.help = true,
                flag if flag.starts_with('-') => bail!("Unknown option {flag}"),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        parsed.symbol = positional.next();
        parsed.timeframe = positional.next();
        if let Some(extra) = positional.next() {
            bail!("Unexpected argument {extra:?}");
        }

        Ok(parsed)
    }
}

/// A command read from stdin.
#[derive(Debug, PartialEq)]
pub enum Command {
    Select { symbol: String, timeframe: String },
    Scroll(i64),
    Resync,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };

        let command = match name {
            "select" => {
                let (Some(symbol), Some(timeframe)) = (words.next(), words.next()) else {
                    bail!("usage: select <symbol> <timeframe>");
                };
                Command::Select {
                    symbol: symbol.to_string(),
                    timeframe: timeframe.to_string(),
                }
            }
            "scroll" => {
                let index = words.next().context("usage: scroll <leading_index>")?;
                let index = index
                    .parse()
                    .with_context(|| format!("invalid bar index {index:?}"))?;
                Command::Scroll(index)
            }
            "resync" => Command::Resync,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command {other:?}"),
        };

        if let Some(extra) = words.next() {
            bail!("unexpected argument {extra:?}");
        }

        Ok(Some(command))
    }
}
