use std::cmp::Ordering;
use std::collections::HashSet;

pub use guidedb_core::similarity::cosine;
use guidedb_core::types::VectorHit;
use guidedb_core::Result;

/// Similarities of one item against the query; `None` where the item lacks a vector.
pub fn score_item(query: &[f32], id: &str, title: Option<&[f32]>, content: Option<&[f32]>) -> Result<VectorHit> {
    Ok(VectorHit {
        id: id.to_string(),
        title_sim: title.map(|v| cosine(query, v)).transpose()?,
        content_sim: content.map(|v| cosine(query, v)).transpose()?,
    })
}

/// Union of the `top_n` best hits by title similarity and the `top_n` best by
/// content similarity. Title picks come first; ties break on id.
pub fn union_top_n(hits: Vec<VectorHit>, top_n: usize) -> Vec<VectorHit> {
    if top_n == 0 { return Vec::new(); }
    let by_title = ranked(&hits, |h| h.title_sim);
    let by_content = ranked(&hits, |h| h.content_sim);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for idx in by_title.into_iter().take(top_n).chain(by_content.into_iter().take(top_n)) {
        if seen.insert(idx) { out.push(hits[idx].clone()); }
    }
    out
}

fn ranked(hits: &[VectorHit], key: impl Fn(&VectorHit) -> Option<f32>) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..hits.len()).filter(|&i| key(&hits[i]).is_some()).collect();
    idx.sort_by(|&a, &b| {
        let (sa, sb) = (key(&hits[a]).unwrap_or(f32::MIN), key(&hits[b]).unwrap_or(f32::MIN));
        sb.partial_cmp(&sa).unwrap_or(Ordering::Equal).then_with(|| hits[a].id.cmp(&hits[b].id))
    });
    idx
}
