use livestore_core::{Identifiable, Predicate, SortDescriptor};
use serde::{Deserialize, Serialize};

use crate::cli::Filter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub deck: Option<String>,
    #[serde(default)]
    pub rank: i64,
}

impl Card {
    pub fn new(id: Option<String>, name: String, deck: Option<String>, rank: i64) -> Self {
        Self {
            id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name,
            deck,
            rank,
        }
    }

    /// Identity-only value for deletes.
    pub fn with_id(id: String) -> Self {
        Self {
            id,
            name: String::new(),
            deck: None,
            rank: 0,
        }
    }
}

impl Identifiable for Card {
    const COLLECTION: &'static str = "card";
    const FIELDS: &'static [&'static str] = &["name", "deck", "rank"];

    fn identity(&self) -> String {
        self.id.clone()
    }
}

impl Filter {
    pub fn predicate(&self) -> Predicate {
        let mut clauses = Vec::new();
        if let Some(text) = &self.contains {
            clauses.push(Predicate::field("name").contains_ignore_case(text.as_str()));
        }
        if let Some(deck) = &self.deck {
            clauses.push(Predicate::field("deck").eq(deck.as_str()));
        }
        clauses.into_iter().fold(Predicate::True, Predicate::and)
    }

    pub fn ordering(&self) -> Vec<SortDescriptor> {
        match self.sort {
            Some(field) if self.desc => vec![SortDescriptor::descending(field.path())],
            Some(field) => vec![SortDescriptor::ascending(field.path())],
            None => Vec::new(),
        }
    }
}

pub fn print_cards(cards: &[Card]) {
    if cards.is_empty() {
        println!("(no cards)");
        return;
    }
    for card in cards {
        println!(
            "{}\t{}\t{}\t{}",
            card.id,
            card.name,
            card.deck.as_deref().unwrap_or("-"),
            card.rank
        );
    }
}
