use crate::url::domain::{extract_domain, registrable_domain};
use crate::url::matcher::matches_wildcard;
use url::Url;

/// Decides whether `url` is inside the crawl scope defined by `seed`
///
/// - By default the host must equal the seed's host
/// - `allow_subdomains` accepts any host under the seed's registrable domain
/// - `allow_external` accepts every host
///
/// The check only looks at hosts; scheme and port are not part of scope.
pub fn in_scope(url: &Url, seed: &Url, allow_external: bool, allow_subdomains: bool) -> bool {
    if allow_external {
        return true;
    }

    let (Some(host), Some(seed_host)) = (extract_domain(url), extract_domain(seed)) else {
        return false;
    };

    if host == seed_host {
        return true;
    }

    if !allow_subdomains {
        return false;
    }

    match registrable_domain(seed) {
        Some(base) => matches_wildcard(&format!("*.{}", base), &host),
        // IP seeds only ever match themselves
        None => false,
    }
}

/// Multi-seed variant: in scope for at least one seed
pub fn in_scope_any<'a, I>(
    url: &Url,
    seeds: I,
    allow_external: bool,
    allow_subdomains: bool,
) -> bool
where
    I: IntoIterator<Item = &'a Url>,
{
    allow_external
        || seeds
            .into_iter()
            .any(|seed| in_scope(url, seed, false, allow_subdomains))
}
