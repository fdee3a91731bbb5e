//! `livestore` command line tool.
//!
//! # Responsibility
//! - Drive a card repository from the shell for local checks.
//! - Show live query updates with `watch`.

mod card;
mod cli;

use anyhow::{anyhow, Context};
use card::{print_cards, Card};
use clap::Parser;
use cli::{Cli, Command};
use futures::StreamExt;
use livestore_core::{
    default_log_level, init_logging, LogTarget, Repository, SqliteRepository, StoreConfig,
};
use log::info;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let target = match cli.log_dir.as_deref() {
        Some(dir) => LogTarget::directory(dir).map_err(|err| anyhow!(err))?,
        None => LogTarget::Stderr,
    };
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    init_logging(level, target).map_err(|err| anyhow!(err))?;

    let repo: SqliteRepository<Card> = SqliteRepository::open(StoreConfig::file(&cli.db))
        .with_context(|| format!("failed to open store `{}`", cli.db.display()))?;

    match cli.command {
        Command::Add {
            name,
            deck,
            rank,
            id,
        } => {
            let card = Card::new(id, name, deck, rank);
            let id = card.id.clone();
            repo.save(card).await.context("save failed")?;
            println!("{id}");
        }
        Command::List { filter } => {
            let cards = repo
                .query(&filter.predicate(), &filter.ordering())?
                .fetch()
                .await
                .context("query failed")?;
            print_cards(&cards);
        }
        Command::Remove { id } => {
            let cards: Vec<Card> = id.into_iter().map(Card::with_id).collect();
            repo.delete_many(&cards).await.context("delete failed")?;
        }
        Command::Clear => {
            repo.delete_all().await.context("clear failed")?;
        }
        Command::Watch { filter, limit } => {
            let mut subscription = repo.query(&filter.predicate(), &filter.ordering())?.subscribe();
            let mut seen = 0usize;
            loop {
                tokio::select! {
                    next = subscription.next() => match next {
                        Some(snapshot) => {
                            let cards = snapshot.context("live query failed")?;
                            seen += 1;
                            println!("-- snapshot {seen} ({} cards)", cards.len());
                            print_cards(&cards);
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
                if limit.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            info!("event=watch_stop module=cli status=ok snapshots={seen}");
        }
    }

    Ok(())
}
