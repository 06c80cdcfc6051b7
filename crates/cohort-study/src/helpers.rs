//! Parametric generators for category dictionaries and ratio tables.
//!
//! Groupings with many levels are generated rather than written by hand:
//! every generated dictionary keys its groups `"1"..="n"` and ends with a
//! default `"0"` for missing or out-of-range input.

use cohort_types::{CategoryDictionary, CategoryRule, Condition, Expectations, Rate, RatioTable};

use crate::error::{StudyError, StudyResult};

/// Category key of the missing/unknown group.
pub const MISSING_CATEGORY: &str = "0";

/// Ethnicity sources in priority order: GP record (OpenSAFELY list), GP
/// record (PRIMIS list), then secondary care.
pub const ETHNICITY_SOURCES: [&str; 3] = [
    "cov_ethnicity_gp_opensafely",
    "cov_ethnicity_gp_primis",
    "cov_ethnicity_sus",
];

/// Variable holding the index of multiple deprivation.
pub const DEPRIVATION_SOURCE: &str = "index_of_multiple_deprivation";

/// Range of the index of multiple deprivation (LSOAs in England).
pub const DEPRIVATION_RANGE: (f64, f64) = (1.0, 32844.0);

/// Builds a dictionary assigning group `i` when the first truthy source
/// equals `i`.
///
/// Produces `n_groups` rules keyed `"1"..="n"` followed by the default `"0"`.
///
/// # Errors
/// Fails with [`StudyError::InvalidGroupCount`] if `n_groups` is zero and
/// [`StudyError::InvalidGroupingSources`] if `sources` is empty.
pub fn generate_grouping_dictionary(
    n_groups: usize,
    sources: &[&str],
) -> StudyResult<CategoryDictionary> {
    if n_groups < 1 {
        return Err(StudyError::InvalidGroupCount { count: n_groups });
    }
    if sources.is_empty() {
        return Err(StudyError::InvalidGroupingSources);
    }

    let mut rules: Vec<CategoryRule> = (1..=n_groups)
        .map(|group| CategoryRule::when(group.to_string(), first_source_equals(sources, group)))
        .collect();
    rules.push(CategoryRule::otherwise(MISSING_CATEGORY));

    CategoryDictionary::from_rules(rules).map_err(|e| StudyError::from_rule("grouping", e))
}

fn first_source_equals(sources: &[&str], group: usize) -> Condition {
    let label = group.to_string();
    let mut branches: Vec<Condition> = sources
        .iter()
        .enumerate()
        .map(|(k, source)| {
            let matches = Condition::eq(*source, label.as_str());
            if k == 0 {
                return matches;
            }
            let mut operands: Vec<Condition> = sources[..k]
                .iter()
                .map(|earlier| Condition::not(Condition::flag(*earlier)))
                .collect();
            operands.push(matches);
            Condition::And(operands)
        })
        .collect();

    if branches.len() == 1 {
        branches.remove(0)
    } else {
        Condition::Or(branches)
    }
}

/// Ethnicity grouping over [`ETHNICITY_SOURCES`].
pub fn generate_ethnicity_dictionary(n_groups: usize) -> StudyResult<CategoryDictionary> {
    generate_grouping_dictionary(n_groups, &ETHNICITY_SOURCES)
}

/// Partitions `source` into `n_tiles` equal-width bands over `[min, max]`.
///
/// Band `i` is `source >= lower AND source < upper`; the top band is open
/// above. Missing values and values below `min` fall to the default `"0"`.
/// The first edge is exactly `min` and the last exactly `max`.
///
/// # Errors
/// Fails with [`StudyError::InvalidGroupCount`] if `n_tiles` is zero and
/// [`StudyError::InvalidRange`] if `min >= max`, either end is not finite, or
/// the range is too narrow to hold `n_tiles` distinct edges.
pub fn generate_ntile_dictionary(
    n_tiles: usize,
    source: &str,
    (min, max): (f64, f64),
) -> StudyResult<CategoryDictionary> {
    if n_tiles < 1 {
        return Err(StudyError::InvalidGroupCount { count: n_tiles });
    }
    let invalid_range = || StudyError::InvalidRange {
        source_variable: source.to_string(),
        min,
        max,
    };
    if !min.is_finite() || !max.is_finite() || min >= max {
        return Err(invalid_range());
    }

    let edges = ntile_edges(n_tiles, min, max);
    if edges.iter().any(|edge| !edge.is_finite()) || edges.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(invalid_range());
    }

    let mut rules: Vec<CategoryRule> = (1..=n_tiles)
        .map(|tile| {
            let lower = Condition::ge(source, edges[tile - 1]);
            let condition = if tile == n_tiles {
                lower
            } else {
                Condition::and([lower, Condition::lt(source, edges[tile])])
            };
            CategoryRule::when(tile.to_string(), condition)
        })
        .collect();
    rules.push(CategoryRule::otherwise(MISSING_CATEGORY));

    CategoryDictionary::from_rules(rules).map_err(|e| StudyError::from_rule(source, e))
}

// Weighted form keeps integer ranges on short decimals (1..32844 gives 3285.3).
fn ntile_edges(n_tiles: usize, min: f64, max: f64) -> Vec<f64> {
    let n = n_tiles as f64;
    (0..=n_tiles)
        .map(|i| match i {
            0 => min,
            i if i == n_tiles => max,
            i => {
                let t = i as f64;
                let edge = (min * (n - t) + max * t) / n;
                if edge.is_finite() {
                    edge
                } else {
                    min + (max - min) / n * t
                }
            }
        })
        .collect()
}

/// Deprivation N-tiles of [`DEPRIVATION_SOURCE`] over [`DEPRIVATION_RANGE`].
pub fn generate_deprivation_ntile_dictionary(n_tiles: usize) -> StudyResult<CategoryDictionary> {
    generate_ntile_dictionary(n_tiles, DEPRIVATION_SOURCE, DEPRIVATION_RANGE)
}

/// Equal shares over `"1"..="n"`, preceded by `"0"` when the missing
/// category is included.
///
/// # Errors
/// Fails with [`StudyError::InvalidGroupCount`] if `n_groups` is zero.
pub fn generate_synthetic_ratio_table(
    n_groups: usize,
    include_missing_category: bool,
) -> StudyResult<RatioTable> {
    if n_groups < 1 {
        return Err(StudyError::InvalidGroupCount { count: n_groups });
    }

    let missing = include_missing_category.then(|| MISSING_CATEGORY.to_string());
    let categories = missing
        .into_iter()
        .chain((1..=n_groups).map(|group| group.to_string()));
    Ok(RatioTable::uniform(categories)?)
}

/// Universal-rate expectations over a synthetic ratio table.
pub fn generate_universal_expectations(
    n_groups: usize,
    include_missing_category: bool,
) -> StudyResult<Expectations> {
    let ratios = generate_synthetic_ratio_table(n_groups, include_missing_category)?;
    Ok(Expectations::new().rate(Rate::Universal).category(ratios))
}
