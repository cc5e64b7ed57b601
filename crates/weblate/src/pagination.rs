use std::collections::VecDeque;

use serde::Deserialize;

use crate::Result;

/// Envelope of every list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Lazy walk over a paginated collection.
///
/// Pages are requested one at a time and only once the previous page's items
/// were consumed. The walk ends when the server stops sending a `next` link.
/// The first failed request is yielded once and ends the walk; iterate again
/// from a fresh `Paginated` to restart.
pub struct Paginated<T, F> {
    fetch: F,
    next_url: Option<String>,
    buffer: VecDeque<T>,
    done: bool,
}

impl<T, F> Paginated<T, F>
where
    F: FnMut(&str) -> Result<Page<T>>,
{
    pub fn new(first_url: impl Into<String>, fetch: F) -> Self {
        Self {
            fetch,
            next_url: Some(first_url.into()),
            buffer: VecDeque::new(),
            done: false,
        }
    }
}

impl<T, F> Iterator for Paginated<T, F>
where
    F: FnMut(&str) -> Result<Page<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            let Some(url) = self.next_url.take() else {
                self.done = true;
                return None;
            };

            match (self.fetch)(&url) {
                Ok(page) => {
                    self.next_url = page.next.filter(|next| !next.is_empty());
                    self.buffer.extend(page.results);
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
