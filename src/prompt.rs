// Interactive prompts

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Select};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

/// Prefix of numbered selection lines (`#0 ...`)
pub const LINE_PREFIX: &str = "#";

/// Lists longer than this are narrowed with a filter first
const FILTER_THRESHOLD: usize = 10;

/// Questions asked to the operator
pub trait Prompt {
    /// Index of the chosen item
    fn select(&self, label: &str, items: &[String]) -> Result<usize>;

    /// Free text answer, `default` when left empty
    fn input(&self, label: &str, default: &str) -> Result<String>;

    /// Yes/no question
    fn confirm(&self, label: &str, default: bool) -> Result<bool>;
}

/// Numbered selection lines: `#0 first`, `#1 second`, ...
pub fn numbered(items: impl IntoIterator<Item = String>) -> Vec<String> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| format!("{}{} {}", LINE_PREFIX, i, item))
        .collect()
}

/// Whether `item` matches the filter `input`.
///
/// Input starting with `#` is anchored on the line prefix so `#1` picks
/// `#1 ...` directly (and `#1` also matches `#10`); anything else is a fuzzy,
/// case-insensitive match.
pub fn matches_filter(matcher: &SkimMatcherV2, input: &str, item: &str) -> bool {
    if input.starts_with(LINE_PREFIX) {
        item.starts_with(input)
    } else {
        matcher.fuzzy_match(item, input).is_some()
    }
}

/// Indices of `items` matching `input`; an empty filter keeps everything
pub fn filter_items(input: &str, items: &[String]) -> Vec<usize> {
    let input = input.trim();
    if input.is_empty() {
        return (0..items.len()).collect();
    }

    let matcher = SkimMatcherV2::default().ignore_case();
    // An exact "#N" wins over longer numbers sharing its prefix
    if input.starts_with(LINE_PREFIX) {
        let exact = format!("{} ", input);
        if let Some(index) = items.iter().position(|item| item.starts_with(&exact)) {
            return vec![index];
        }
    }

    items
        .iter()
        .enumerate()
        .filter(|(_, item)| matches_filter(&matcher, input, item))
        .map(|(i, _)| i)
        .collect()
}

/// Terminal prompts
#[derive(Debug, Clone, Copy, Default)]
pub struct Prompter;

impl Prompt for Prompter {
    fn select(&self, label: &str, items: &[String]) -> Result<usize> {
        anyhow::ensure!(!items.is_empty(), "Nothing to select for: {}", label);

        let mut candidates: Vec<usize> = (0..items.len()).collect();
        if items.len() > FILTER_THRESHOLD {
            loop {
                let filter: String = Input::new()
                    .with_prompt(format!(
                        "{} - filter (fuzzy, or {}N to choose directly)",
                        label, LINE_PREFIX
                    ))
                    .allow_empty(true)
                    .interact_text()
                    .context("Failed to read filter")?;

                candidates = filter_items(&filter, items);
                if !candidates.is_empty() {
                    break;
                }
                println!("No match for \"{}\"", filter);
            }
        }

        if candidates.len() == 1 {
            return Ok(candidates[0]);
        }

        let shown: Vec<&str> = candidates.iter().map(|&i| items[i].as_str()).collect();
        let choice = Select::new()
            .with_prompt(label)
            .items(&shown)
            .default(0)
            .max_length(20)
            .interact()
            .context("Failed to read selection")?;

        Ok(candidates[choice])
    }

    fn input(&self, label: &str, default: &str) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(label).allow_empty(true);
        if !default.is_empty() {
            input = input.default(default.to_string());
        }
        let value = input
            .interact_text()
            .with_context(|| format!("Failed to read {}", label))?;
        Ok(value.trim().to_string())
    }

    fn confirm(&self, label: &str, default: bool) -> Result<bool> {
        Confirm::new()
            .with_prompt(label)
            .default(default)
            .interact()
            .context("Failed to read confirmation")
    }
}
