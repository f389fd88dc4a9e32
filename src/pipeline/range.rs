//! Page-range resolution: `"1-3,5,7"` → `[1, 2, 3, 5, 7]`.
//!
//! Parsing is permissive. A token that is malformed, out of range or
//! reversed is dropped rather than reported as an error, and an expression that
//! leaves nothing behind falls back to every page. The result is never empty
//! for a document with at least one page.
//!
//! Callers that want to surface what was dropped use
//! [`resolve_with_report`], which returns the same pages plus the rejected
//! tokens and why each was rejected.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

static RE_SINGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)$").unwrap());
static RE_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s*-\s*(\d+)$").unwrap());

/// Why a range token was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Not a number or a `start-end` pair.
    Malformed,
    /// A single page (or a range start) beyond the document.
    OutOfRange,
    /// Page zero, or a range starting at zero.
    StartNotPositive,
    /// `start > end`.
    Reversed,
}

/// A token the resolver dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedToken {
    pub token: String,
    pub reason: RejectReason,
}

/// Pages selected by a range expression, plus diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeReport {
    /// 1-based page numbers, strictly ascending.
    pub pages: Vec<usize>,
    pub rejected: Vec<RejectedToken>,
    /// True when nothing valid was selected and every page was used instead.
    pub fell_back: bool,
}

impl RangeReport {
    /// Comma-joined rejected tokens, for error messages.
    pub fn rejected_summary(&self) -> String {
        self.rejected
            .iter()
            .map(|r| format!("'{}' ({:?})", r.token, r.reason))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Resolve `expr` against a document of `page_count` pages.
pub fn resolve(expr: &str, page_count: usize) -> Vec<usize> {
    resolve_with_report(expr, page_count).pages
}

/// Resolve `expr`, keeping track of every token that was dropped.
pub fn resolve_with_report(expr: &str, page_count: usize) -> RangeReport {
    let mut pages = BTreeSet::new();
    let mut rejected = Vec::new();

    for raw in expr.split(',') {
        let token = raw.trim();
        if token.is_empty() {
            continue;
        }
        match classify(token, page_count) {
            Ok((start, end)) => pages.extend(start..=end),
            Err(reason) => rejected.push(RejectedToken {
                token: token.to_string(),
                reason,
            }),
        }
    }

    let fell_back = pages.is_empty();
    let pages = if fell_back {
        (1..=page_count).collect()
    } else {
        pages.into_iter().collect()
    };

    RangeReport {
        pages,
        rejected,
        fell_back,
    }
}

/// Map one token to an inclusive, in-bounds page span.
fn classify(token: &str, page_count: usize) -> Result<(usize, usize), RejectReason> {
    if let Some(caps) = RE_SINGLE.captures(token) {
        let page = parse_page(&caps[1])?;
        return match page {
            0 => Err(RejectReason::StartNotPositive),
            p if p > page_count => Err(RejectReason::OutOfRange),
            p => Ok((p, p)),
        };
    }

    if let Some(caps) = RE_SPAN.captures(token) {
        let start = parse_page(&caps[1])?;
        let end = parse_page(&caps[2])?;
        if start == 0 {
            return Err(RejectReason::StartNotPositive);
        }
        if start > end {
            return Err(RejectReason::Reversed);
        }
        let end = end.min(page_count);
        if start > end {
            return Err(RejectReason::OutOfRange);
        }
        return Ok((start, end));
    }

    Err(RejectReason::Malformed)
}

/// Numbers too large for `usize` saturate; they are capped or rejected as
/// out of range like any other page past the end.
fn parse_page(digits: &str) -> Result<usize, RejectReason> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RejectReason::Malformed);
    }
    Ok(digits.parse().unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_singles_and_spans() {
        assert_eq!(resolve("1-3,5,7", 10), vec![1, 2, 3, 5, 7]);
    }

    #[test]
    fn empty_spec_selects_everything() {
        assert_eq!(resolve("", 4), vec![1, 2, 3, 4]);
        assert_eq!(resolve("  ,  ", 3), vec![1, 2, 3]);
    }

    #[test]
    fn span_beyond_document_falls_back() {
        let report = resolve_with_report("50-60", 10);
        assert!(report.fell_back);
        assert_eq!(report.pages, (1..=10).collect::<Vec<_>>());
        assert_eq!(report.rejected[0].reason, RejectReason::OutOfRange);
    }

    #[test]
    fn span_from_zero_is_dropped_whole() {
        let report = resolve_with_report("0-5", 10);
        assert!(report.fell_back);
        assert_eq!(report.rejected[0].reason, RejectReason::StartNotPositive);
        // Not partially honoured as 1-5.
        assert_eq!(report.pages.len(), 10);
    }

    #[test]
    fn span_end_is_capped() {
        assert_eq!(resolve("8-20", 10), vec![8, 9, 10]);
    }

    #[test]
    fn oversized_numbers_saturate() {
        assert_eq!(resolve("5-99999999999999999999", 10), vec![5, 6, 7, 8, 9, 10]);

        let report = resolve_with_report("99999999999999999999,2", 10);
        assert_eq!(report.pages, vec![2]);
        assert_eq!(report.rejected[0].reason, RejectReason::OutOfRange);

        let report = resolve_with_report("99999999999999999999-3", 10);
        assert_eq!(report.rejected[0].reason, RejectReason::Reversed);
    }

    #[test]
    fn reversed_span_is_dropped() {
        let report = resolve_with_report("5-3,2", 10);
        assert_eq!(report.pages, vec![2]);
        assert_eq!(report.rejected[0].reason, RejectReason::Reversed);
    }

    #[test]
    fn duplicates_and_order_are_normalised() {
        assert_eq!(resolve("7,1-3,2,7,3", 10), vec![1, 2, 3, 7]);
    }

    #[test]
    fn whitespace_is_tolerated() {
        assert_eq!(resolve(" 1 - 2 , 4 ", 5), vec![1, 2, 4]);
    }

    #[test]
    fn malformed_tokens_are_ignored() {
        let report = resolve_with_report("abc,2,-4,3-,1-2-3,1\u{663}", 5);
        assert_eq!(report.pages, vec![2]);
        assert_eq!(report.rejected.len(), 5);
        assert!(report
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::Malformed));
    }

    #[test]
    fn single_out_of_range_dropped() {
        let report = resolve_with_report("0,11,3", 10);
        assert_eq!(report.pages, vec![3]);
        assert_eq!(report.rejected.len(), 2);
        assert!(!report.fell_back);
    }

    #[test]
    fn output_is_strictly_ascending() {
        for expr in ["", "3,1,2", "1-10,5-6", "9,8,7-9", "x,y"] {
            let pages = resolve(expr, 9);
            assert!(!pages.is_empty(), "expr {expr:?}");
            assert!(pages.windows(2).all(|w| w[0] < w[1]), "expr {expr:?}");
            assert!(pages.iter().all(|&p| (1..=9).contains(&p)));
        }
    }

    #[test]
    fn rejected_summary_lists_tokens() {
        let report = resolve_with_report("0,zz", 3);
        let s = report.rejected_summary();
        assert!(s.contains("'0'"));
        assert!(s.contains("'zz'"));
    }
}
