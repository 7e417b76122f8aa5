use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::Path;

use chrono::NaiveDate;

use crate::dataset::DatasetCache;
use crate::models::FilterCriteria;
use crate::pipeline;
use crate::report;

const HELP: &str = "\
commands:
  period <from> <to>   restrict to purchase dates (YYYY-MM-DD), inclusive
  period               drop the date restriction
  status <a,b,...>     order statuses to keep (empty keeps nothing)
  payment <a,b,...>    payment methods to keep (empty keeps nothing)
  reset                select the full date span and every value
  reload               read the dataset from disk again
  options              list available filter values
  show                 print the dashboard again
  quit                 leave the session";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Period(Vec<NaiveDate>),
    Status(BTreeSet<String>),
    Payment(BTreeSet<String>),
    Reset,
    Reload,
    Options,
    Show,
    Help,
    Quit,
}

impl SessionCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

        match word.to_ascii_lowercase().as_str() {
            "period" => rest
                .split_whitespace()
                .map(|raw| {
                    raw.parse::<NaiveDate>()
                        .map_err(|err| format!("invalid date '{raw}': {err}"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(SessionCommand::Period),
            "status" => Ok(SessionCommand::Status(split_values(rest))),
            "payment" => Ok(SessionCommand::Payment(split_values(rest))),
            "reset" => Ok(SessionCommand::Reset),
            "reload" => Ok(SessionCommand::Reload),
            "options" => Ok(SessionCommand::Options),
            "show" | "" => Ok(SessionCommand::Show),
            "help" | "?" => Ok(SessionCommand::Help),
            "quit" | "exit" => Ok(SessionCommand::Quit),
            other => Err(format!("unknown command '{other}', try 'help'")),
        }
    }
}

fn split_values(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads filter commands line by line and re-renders the dashboard after each
/// change. The dataset is fetched through the cache on every render, so edits
/// to the file on disk are picked up between commands.
pub fn run<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    cache: &mut DatasetCache,
    path: &Path,
    currency: &str,
) -> anyhow::Result<()> {
    let dataset = cache.get(path)?;
    let mut criteria = dataset.filter_options().default_criteria();
    render(&mut output, cache, path, &criteria, currency)?;

    for line in input.lines() {
        let line = line?;
        let command = match SessionCommand::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                writeln!(output, "{message}")?;
                continue;
            }
        };

        match command {
            SessionCommand::Period(dates) => criteria.date_range = dates,
            SessionCommand::Status(values) => criteria.statuses = values,
            SessionCommand::Payment(values) => criteria.payment_types = values,
            SessionCommand::Reset => {
                criteria = cache.get(path)?.filter_options().default_criteria();
            }
            SessionCommand::Reload => {
                cache.invalidate(path);
                let dataset = cache.get(path)?;
                tracing::info!(rows = dataset.len(), cached = cache.len(), "dataset reloaded");
            }
            SessionCommand::Options => {
                let options = cache.get(path)?.filter_options();
                writeln!(output, "{}", serde_json::to_string_pretty(&options)?)?;
                continue;
            }
            SessionCommand::Show => {}
            SessionCommand::Help => {
                writeln!(output, "{HELP}")?;
                continue;
            }
            SessionCommand::Quit => break,
        }

        render(&mut output, cache, path, &criteria, currency)?;
    }

    Ok(())
}

fn render<W: Write>(
    output: &mut W,
    cache: &mut DatasetCache,
    path: &Path,
    criteria: &FilterCriteria,
    currency: &str,
) -> anyhow::Result<()> {
    let dataset = cache.get(path)?;
    let view = pipeline::build_view(&dataset, criteria);
    writeln!(output, "{}", report::render_summary(&view, currency))?;
    output.flush()?;
    Ok(())
}
