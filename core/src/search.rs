use crate::error::Result;
use crate::index::{DocId, IndexReader, Posting};
use crate::query::{Occur, Query};
use std::collections::{BTreeMap, BTreeSet};

/// How matched terms contribute to a document's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scoring {
    /// Sum of occurrence counts.
    #[default]
    Frequency,
    /// `(1 + ln tf) * ln(1 + N / df)`, summed over matched terms.
    TfIdf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreDoc {
    pub doc_id: DocId,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopDocs {
    /// Number of matching documents before truncation.
    pub total_hits: usize,
    /// Descending by score, ties by ascending doc id.
    pub hits: Vec<ScoreDoc>,
}

type Scores = BTreeMap<DocId, f32>;

pub struct Searcher<'a, R: IndexReader + ?Sized> {
    reader: &'a R,
    field: String,
    scoring: Scoring,
}

impl<'a, R: IndexReader + ?Sized> Searcher<'a, R> {
    /// `field` is the name documents were indexed under; terms on any other field match nothing.
    pub fn new(reader: &'a R, field: impl Into<String>) -> Self {
        Self { reader, field: field.into(), scoring: Scoring::default() }
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn search(&self, query: &Query, limit: usize) -> Result<TopDocs> {
        let scores = self.evaluate(query)?;
        let total_hits = scores.len();
        let mut hits: Vec<ScoreDoc> = scores.into_iter().map(|(doc_id, score)| ScoreDoc { doc_id, score }).collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
        hits.truncate(limit);
        Ok(TopDocs { total_hits, hits })
    }

    fn term_score(&self, freq: u32, doc_freq: u32) -> f32 {
        match self.scoring {
            Scoring::Frequency => freq as f32,
            Scoring::TfIdf => {
                let n = self.reader.num_docs().max(1) as f32;
                let df = doc_freq.max(1) as f32;
                (1.0 + (freq as f32).ln()) * (1.0 + n / df).ln()
            }
        }
    }

    fn evaluate(&self, query: &Query) -> Result<Scores> {
        match query {
            Query::Term { field, term } => {
                if *field != self.field {
                    return Ok(Scores::new());
                }
                let postings = self.reader.postings(term)?;
                let df = self.reader.doc_freq(term);
                Ok(postings.iter().map(|p| (p.doc_id, self.term_score(p.freq, df))).collect())
            }
            Query::Phrase { field, terms, slop } => {
                if *field != self.field {
                    return Ok(Scores::new());
                }
                self.evaluate_phrase(terms, *slop)
            }
            Query::Boolean(clauses) => {
                let mut required: Option<Scores> = None;
                let mut optional: Vec<Scores> = Vec::new();
                let mut excluded: BTreeSet<DocId> = BTreeSet::new();
                for clause in clauses {
                    let scores = self.evaluate(&clause.query)?;
                    match clause.occur {
                        Occur::Must => {
                            required = Some(match required {
                                None => scores,
                                Some(acc) => acc
                                    .into_iter()
                                    .filter_map(|(doc, s)| scores.get(&doc).map(|t| (doc, s + t)))
                                    .collect(),
                            });
                        }
                        Occur::Should => optional.push(scores),
                        Occur::MustNot => excluded.extend(scores.into_keys()),
                    }
                }
                let mut result = match required {
                    Some(mut acc) => {
                        for scores in &optional {
                            for (doc, s) in acc.iter_mut() {
                                if let Some(t) = scores.get(doc) {
                                    *s += t;
                                }
                            }
                        }
                        acc
                    }
                    None => {
                        let mut acc = Scores::new();
                        for scores in optional {
                            for (doc, s) in scores {
                                *acc.entry(doc).or_insert(0.0) += s;
                            }
                        }
                        acc
                    }
                };
                result.retain(|doc, _| !excluded.contains(doc));
                Ok(result)
            }
        }
    }

    fn evaluate_phrase(&self, terms: &[(String, u32)], slop: u32) -> Result<Scores> {
        let mut lists = Vec::with_capacity(terms.len());
        for (term, _) in terms {
            let postings = self.reader.postings(term)?;
            if postings.is_empty() {
                return Ok(Scores::new());
            }
            lists.push(postings);
        }
        // Docs containing every term; walk the shortest list.
        let shortest = lists.iter().min_by_key(|l| l.len()).map(|l| l.as_slice()).unwrap_or(&[]);
        let mut freqs: Vec<(DocId, u32)> = Vec::new();
        'docs: for candidate in shortest {
            let mut normalized: Vec<Vec<(i64, u32)>> = Vec::with_capacity(terms.len());
            for (list, (_, offset)) in lists.iter().zip(terms) {
                let Some(posting) = find_posting(list, candidate.doc_id) else { continue 'docs };
                normalized.push(posting.positions.iter().map(|&p| (p as i64 - *offset as i64, p)).collect());
            }
            let freq = phrase_freq(&normalized, slop);
            if freq > 0 {
                freqs.push((candidate.doc_id, freq));
            }
        }
        let df = freqs.len() as u32;
        Ok(freqs.into_iter().map(|(doc, freq)| (doc, self.term_score(freq, df))).collect())
    }
}

fn find_posting(list: &[Posting], doc_id: DocId) -> Option<&Posting> {
    list.binary_search_by_key(&doc_id, |p| p.doc_id).ok().map(|i| &list[i])
}

/// Count non-overlapping windows holding one position of every phrase term
/// whose offset-adjusted positions lie within `slop` of each other.
///
/// Each entry is `(adjusted, position)`. A window only counts when every
/// phrase slot can be filled from a different token position, so a repeated
/// term never reuses one occurrence for two slots.
fn phrase_freq(lists: &[Vec<(i64, u32)>], slop: u32) -> u32 {
    let k = lists.len();
    let mut merged: Vec<(i64, usize, u32)> = lists
        .iter()
        .enumerate()
        .flat_map(|(i, l)| l.iter().map(move |&(q, p)| (q, i, p)))
        .collect();
    merged.sort_unstable();

    let mut counts = vec![0u32; k];
    let mut covered = 0;
    let mut left = 0;
    let mut freq = 0;
    for right in 0..merged.len() {
        let (_, i, _) = merged[right];
        if counts[i] == 0 {
            covered += 1;
        }
        counts[i] += 1;
        while covered == k {
            let window = &merged[left..=right];
            if merged[right].0 - merged[left].0 <= slop as i64 && distinct_positions(window, k) {
                freq += 1;
                counts.iter_mut().for_each(|c| *c = 0);
                covered = 0;
                left = right + 1;
                break;
            }
            let (_, j, _) = merged[left];
            counts[j] -= 1;
            if counts[j] == 0 {
                covered -= 1;
            }
            left += 1;
        }
    }
    freq
}

/// Whether each of the `k` slots in `window` can take a token position no other slot uses.
fn distinct_positions(window: &[(i64, usize, u32)], k: usize) -> bool {
    let mut options: Vec<Vec<u32>> = vec![Vec::new(); k];
    for &(_, slot, pos) in window {
        options[slot].push(pos);
    }
    let mut used = Vec::with_capacity(k);
    assign(&options, 0, &mut used)
}

fn assign(options: &[Vec<u32>], slot: usize, used: &mut Vec<u32>) -> bool {
    let Some(candidates) = options.get(slot) else { return true };
    for &pos in candidates {
        if used.contains(&pos) {
            continue;
        }
        used.push(pos);
        if assign(options, slot + 1, used) {
            return true;
        }
        used.pop();
    }
    false
}
