//! Domain name helpers shared by the signal classifier and the extractor

use url::Url;

/// Lower-cases, trims and drops a leading `www.` or `m.` label.
pub fn normalize_domain(raw: &str) -> String {
    let lower = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    for prefix in ["www.", "m."] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            if rest.contains('.') {
                return rest.to_string();
            }
        }
    }
    lower
}

/// A registrable-looking host: at least two non-empty labels of `[a-z0-9-]`.
pub fn is_well_formed(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        })
}

/// Publishing domain of a graph IRI, if it is an http(s) URL with a host.
pub fn domain_of_url(iri: &str) -> Option<String> {
    let url = Url::parse(iri).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    let domain = normalize_domain(host);
    (!domain.is_empty()).then_some(domain)
}

/// Suffix used for the TLD rules: a two-label suffix when it is listed in
/// `compound_suffixes`, otherwise the last label.
pub fn effective_tld<'a>(domain: &'a str, compound_suffixes: &[String]) -> &'a str {
    let mut dots = domain.rmatch_indices('.').map(|(i, _)| i);
    let last_dot = dots.next();
    if let Some(second_dot) = dots.next() {
        let compound = &domain[second_dot + 1..];
        if compound_suffixes.iter().any(|s| s == compound) {
            return compound;
        }
    }
    match last_dot {
        Some(i) => &domain[i + 1..],
        None => domain,
    }
}

/// Splits the labels in front of the TLD into known keywords and leftovers.
///
/// Keywords are consumed longest first within each label, so `northyorkarts`
/// yields `northyork` and never a second hit on `york`.
pub fn segment_labels(domain: &str, tld: &str, keywords: &[&str]) -> Vec<String> {
    let head = domain.strip_suffix(tld).map_or(domain, |h| h.trim_end_matches('.'));
    let mut sorted: Vec<&str> = keywords.iter().copied().filter(|k| !k.is_empty()).collect();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    sorted.dedup();

    let mut words = Vec::new();
    for part in head.split(|c| c == '.' || c == '-').filter(|p| !p.is_empty()) {
        let mut remaining = part.to_string();
        for keyword in &sorted {
            if let Some(idx) = remaining.find(keyword) {
                words.push((*keyword).to_string());
                remaining.replace_range(idx..idx + keyword.len(), "");
            }
        }
        if !remaining.is_empty() {
            words.push(remaining);
        }
    }
    words
}
