//! Ordered variable sets and their validating builder.
//!
//! Variables are appended one at a time. Every append is checked against the
//! variables already declared, so a finished [`VariableSet`] never contains a
//! forward reference or a cycle, and its declaration order is a valid
//! evaluation order.

use cohort_types::{
    CategoryDictionary, CategoryRule, Condition, Expectations, Query, Returning, Rule,
    ValueKind, VariableSpec,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{StudyError, StudyResult};

/// An ordered `name -> spec` mapping in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableSet {
    variables: IndexMap<String, VariableSpec>,
}

impl VariableSet {
    /// Returns the spec of `name`.
    pub fn get(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.get(name)
    }

    /// Returns true if `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Returns the number of variables, hidden ones included.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns true if no variables are declared.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterates over variable names in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Iterates over `(name, spec)` pairs in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableSpec)> {
        self.variables.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Iterates over the names of output (non-hidden) variables.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, spec)| !spec.hidden)
            .map(|(name, _)| name)
    }

    /// Returns the kind of value `name` resolves to.
    ///
    /// Aggregates take the kind of their first input.
    pub fn kind_of(&self, name: &str) -> Option<ValueKind> {
        match &self.get(name)?.rule {
            Rule::Lookup(query) => Some(query.returning().kind()),
            Rule::MinimumOf(inputs) | Rule::MaximumOf(inputs) => {
                inputs.first().and_then(|first| self.kind_of(first))
            }
            Rule::CategorisedAs(_) => Some(ValueKind::Category),
            Rule::Satisfying(_) => Some(ValueKind::Bool),
        }
    }
}

/// Builds a [`VariableSet`], validating each variable as it is appended.
///
/// # Example
///
/// ```
/// use cohort_study::VariableSetBuilder;
/// use cohort_types::{CategoryRule, Condition, Expectations};
///
/// let mut builder = VariableSetBuilder::new();
/// let err = builder
///     .categorised_as(
///         "cov_cat_smoking_status",
///         vec![CategoryRule::when("S", Condition::eq("most_recent_smoking_code", "S"))],
///         Vec::new(),
///         Expectations::new(),
///     )
///     .unwrap_err();
/// assert!(err.to_string().contains("no DEFAULT rule"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct VariableSetBuilder {
    set: VariableSet,
}

impl VariableSetBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the variables declared so far.
    pub fn declared(&self) -> &VariableSet {
        &self.set
    }

    /// Appends one variable.
    ///
    /// # Errors
    /// - [`StudyError::DuplicateVariable`] if `name` is taken
    /// - [`StudyError::UnresolvedReference`] if the rule reads an undeclared variable
    /// - [`StudyError::EmptyAggregate`] for an aggregate without inputs
    /// - [`StudyError::TypeMismatch`] for aggregate inputs of different kinds
    /// - [`StudyError::InvalidWindow`] for a misordered literal window
    /// - [`StudyError::IncompatibleReturning`] if the lookup cannot return the requested type
    /// - [`StudyError::InvalidCategory`] for category returns from an uncategorised codelist
    pub fn add(&mut self, name: impl Into<String>, spec: VariableSpec) -> StudyResult<&mut Self> {
        let name = name.into();
        if self.set.contains(&name) {
            return Err(StudyError::DuplicateVariable { name });
        }

        self.check_references(&name, spec.references())?;

        match &spec.rule {
            Rule::Lookup(query) => validate_lookup(&name, query)?,
            Rule::MinimumOf(inputs) | Rule::MaximumOf(inputs) => {
                self.validate_aggregate(&name, inputs)?
            }
            Rule::CategorisedAs(_) | Rule::Satisfying(_) => {}
        }

        trace!(variable = %name, rule = spec.rule.engine_name(), hidden = spec.hidden, "declared variable");
        self.set.variables.insert(name, spec);
        Ok(self)
    }

    /// Appends a direct lookup.
    pub fn lookup(
        &mut self,
        name: impl Into<String>,
        query: Query,
        expectations: Expectations,
    ) -> StudyResult<&mut Self> {
        self.add(name, VariableSpec::lookup(query).expecting(expectations))
    }

    /// Appends `minimum_of(inputs...)`.
    pub fn minimum_of(&mut self, name: impl Into<String>, inputs: &[&str]) -> StudyResult<&mut Self> {
        self.add(name, VariableSpec::minimum_of(inputs.iter().copied()))
    }

    /// Appends `maximum_of(inputs...)`.
    pub fn maximum_of(&mut self, name: impl Into<String>, inputs: &[&str]) -> StudyResult<&mut Self> {
        self.add(name, VariableSpec::maximum_of(inputs.iter().copied()))
    }

    /// Appends a `categorised_as` variable with its inline inputs.
    ///
    /// The inputs are declared hidden, in order, immediately before the
    /// variable that uses them.
    ///
    /// # Errors
    /// Fails with [`StudyError::NonExhaustiveRule`], [`StudyError::MisplacedDefault`]
    /// or [`StudyError::DuplicateCategory`] for an invalid rule list, and with
    /// any error of [`Self::add`].
    pub fn categorised_as(
        &mut self,
        name: impl Into<String>,
        rules: Vec<CategoryRule>,
        inputs: Vec<(String, VariableSpec)>,
        expectations: Expectations,
    ) -> StudyResult<&mut Self> {
        let name = name.into();
        let dictionary =
            CategoryDictionary::from_rules(rules).map_err(|e| StudyError::from_rule(&name, e))?;
        self.categorised_as_dictionary(name, dictionary, inputs, expectations)
    }

    /// Like [`Self::categorised_as`] with an already-validated dictionary.
    pub fn categorised_as_dictionary(
        &mut self,
        name: impl Into<String>,
        dictionary: CategoryDictionary,
        inputs: Vec<(String, VariableSpec)>,
        expectations: Expectations,
    ) -> StudyResult<&mut Self> {
        self.add_group(inputs, name, VariableSpec::categorised_as(dictionary).expecting(expectations))
    }

    /// Appends a `satisfying` variable with its inline inputs.
    pub fn satisfying(
        &mut self,
        name: impl Into<String>,
        condition: Condition,
        inputs: Vec<(String, VariableSpec)>,
    ) -> StudyResult<&mut Self> {
        self.add_group(inputs, name, VariableSpec::satisfying(condition))
    }

    /// Finishes the set.
    pub fn build(self) -> VariableSet {
        self.set
    }

    /// Checks that every reference of `variable` is already declared.
    ///
    /// # Errors
    /// Fails with [`StudyError::UnresolvedReference`] naming the first missing one.
    pub fn check_references<I, S>(&self, variable: &str, references: I) -> StudyResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for reference in references {
            let reference = reference.as_ref();
            if !self.set.contains(reference) {
                return Err(StudyError::UnresolvedReference {
                    variable: variable.to_string(),
                    reference: reference.to_string(),
                });
            }
        }
        Ok(())
    }

    // Appends hidden inputs then the variable; on any error the set is
    // truncated back to where it started.
    fn add_group(
        &mut self,
        inputs: Vec<(String, VariableSpec)>,
        name: impl Into<String>,
        spec: VariableSpec,
    ) -> StudyResult<&mut Self> {
        let mark = self.set.len();
        if let Err(error) = self.try_add_group(inputs, name.into(), spec) {
            self.set.variables.truncate(mark);
            return Err(error);
        }
        Ok(self)
    }

    fn try_add_group(
        &mut self,
        inputs: Vec<(String, VariableSpec)>,
        name: String,
        spec: VariableSpec,
    ) -> StudyResult<()> {
        for (input, input_spec) in inputs {
            self.add(input, input_spec.hidden())?;
        }
        self.add(name, spec)?;
        Ok(())
    }

    fn validate_aggregate(&self, name: &str, inputs: &[String]) -> StudyResult<()> {
        let mut kinds = inputs.iter().filter_map(|input| self.set.kind_of(input));
        let Some(expected) = kinds.next() else {
            return Err(StudyError::EmptyAggregate {
                variable: name.to_string(),
            });
        };
        if let Some(found) = kinds.find(|kind| *kind != expected) {
            return Err(StudyError::TypeMismatch {
                variable: name.to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }
}

fn validate_lookup(name: &str, query: &Query) -> StudyResult<()> {
    let returning = query.returning();
    if !query.returning_supported() {
        return Err(StudyError::IncompatibleReturning {
            variable: name.to_string(),
            query: query.engine_name(),
            returning,
        });
    }

    if returning == Returning::Category {
        if let Some(codelist) = query.codelist().filter(|c| !c.is_categorised()) {
            return Err(StudyError::InvalidCategory {
                variable: name.to_string(),
                codelist: codelist.label(),
            });
        }
    }

    for window in query.windows() {
        window.validate().map_err(|source| StudyError::InvalidWindow {
            variable: name.to_string(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_types::{
        CodeSelection, Codelist, CodingSystem, DateBound, DateWindow, Period,
    };

    fn flag(window: DateWindow) -> VariableSpec {
        VariableSpec::lookup(Query::DiedFromAnyCause {
            period: Period::new(window, Returning::BinaryFlag),
        })
    }

    fn death_date() -> VariableSpec {
        VariableSpec::lookup(Query::DiedFromAnyCause {
            period: Period::new(DateWindow::on_or_after(DateBound::IndexDate), Returning::DateOfDeath),
        })
    }

    #[test]
    fn test_declaration_order_preserved() {
        let mut builder = VariableSetBuilder::new();
        builder
            .add("b", flag(DateWindow::unbounded()))
            .unwrap()
            .add("a", flag(DateWindow::unbounded()))
            .unwrap()
            .maximum_of("any", &["b", "a"])
            .unwrap();
        let set = builder.build();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["b", "a", "any"]);
        assert_eq!(set.kind_of("any"), Some(ValueKind::Bool));
    }

    #[test]
    fn test_duplicate_variable() {
        let mut builder = VariableSetBuilder::new();
        builder.add("has_died", flag(DateWindow::unbounded())).unwrap();
        let err = builder.add("has_died", flag(DateWindow::unbounded())).unwrap_err();
        assert!(matches!(err, StudyError::DuplicateVariable { .. }));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut builder = VariableSetBuilder::new();
        builder.add("d1", death_date()).unwrap();
        let err = builder.minimum_of("death_date", &["d1", "d2"]).unwrap_err();
        assert!(matches!(
            err,
            StudyError::UnresolvedReference { ref variable, ref reference }
                if variable == "death_date" && reference == "d2"
        ));
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut builder = VariableSetBuilder::new();
        let err = builder
            .satisfying("loop", Condition::flag("loop"), Vec::new())
            .unwrap_err();
        assert!(matches!(err, StudyError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_window_variable_reference_checked() {
        let mut builder = VariableSetBuilder::new();
        let spec = flag(DateWindow::on_or_after(DateBound::variable("exp_date_covid19_confirmed")));
        let err = builder.add("sub", spec).unwrap_err();
        assert!(matches!(err, StudyError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_empty_aggregate() {
        let mut builder = VariableSetBuilder::new();
        let err = builder.minimum_of("none", &[]).unwrap_err();
        assert!(matches!(err, StudyError::EmptyAggregate { .. }));
    }

    #[test]
    fn test_aggregate_type_mismatch() {
        let mut builder = VariableSetBuilder::new();
        builder.add("flag", flag(DateWindow::unbounded())).unwrap();
        builder.add("date", death_date()).unwrap();
        let err = builder.maximum_of("mixed", &["flag", "date"]).unwrap_err();
        assert!(matches!(
            err,
            StudyError::TypeMismatch { expected: ValueKind::Bool, found: ValueKind::Date, .. }
        ));
    }

    #[test]
    fn test_non_exhaustive_rule() {
        let mut builder = VariableSetBuilder::new();
        builder.add("x", flag(DateWindow::unbounded())).unwrap();
        let err = builder
            .categorised_as(
                "cat",
                vec![
                    CategoryRule::when("Yes", Condition::flag("x")),
                    CategoryRule::when("No", Condition::not(Condition::flag("x"))),
                ],
                Vec::new(),
                Expectations::new(),
            )
            .unwrap_err();
        assert!(matches!(err, StudyError::NonExhaustiveRule { ref variable } if variable == "cat"));
    }

    #[test]
    fn test_inline_inputs_hidden_and_first() {
        let mut builder = VariableSetBuilder::new();
        builder
            .satisfying(
                "registered",
                Condition::flag("registered_at_start"),
                vec![(
                    "registered_at_start".to_string(),
                    VariableSpec::lookup(Query::RegisteredAsOf {
                        date: DateBound::IndexDate,
                    }),
                )],
            )
            .unwrap();
        let set = builder.build();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["registered_at_start", "registered"]);
        assert!(set.get("registered_at_start").unwrap().hidden);
        assert_eq!(set.output_names().collect::<Vec<_>>(), vec!["registered"]);
    }

    #[test]
    fn test_failed_group_leaves_set_unchanged() {
        let mut builder = VariableSetBuilder::new();
        builder.add("cat", flag(DateWindow::unbounded())).unwrap();
        let rules = || {
            vec![
                CategoryRule::when("Yes", Condition::flag("x")),
                CategoryRule::otherwise("No"),
            ]
        };
        let inputs = || vec![("x".to_string(), flag(DateWindow::unbounded()))];

        let err = builder
            .categorised_as("cat", rules(), inputs(), Expectations::new())
            .unwrap_err();
        assert!(matches!(err, StudyError::DuplicateVariable { ref name } if name == "cat"));
        assert_eq!(builder.declared().names().collect::<Vec<_>>(), vec!["cat"]);

        builder
            .categorised_as("cat2", rules(), inputs(), Expectations::new())
            .unwrap();
        assert_eq!(builder.declared().names().collect::<Vec<_>>(), vec!["cat", "x", "cat2"]);
    }

    #[test]
    fn test_failed_satisfying_rolls_back_inputs() {
        let mut builder = VariableSetBuilder::new();
        let err = builder
            .satisfying(
                "registered",
                Condition::and([Condition::flag("registered_at_start"), Condition::flag("later")]),
                vec![("registered_at_start".to_string(), flag(DateWindow::unbounded()))],
            )
            .unwrap_err();
        assert!(matches!(err, StudyError::UnresolvedReference { ref reference, .. } if reference == "later"));
        assert!(builder.declared().is_empty());
    }

    #[test]
    fn test_invalid_window() {
        let mut builder = VariableSetBuilder::new();
        let window = DateWindow::between(
            DateBound::ymd(2019, 12, 31).unwrap(),
            DateBound::ymd(2019, 1, 1).unwrap(),
        );
        let err = builder.add("consultations", flag(window)).unwrap_err();
        assert!(matches!(err, StudyError::InvalidWindow { .. }));
    }

    #[test]
    fn test_incompatible_returning() {
        let mut builder = VariableSetBuilder::new();
        let spec = VariableSpec::lookup(Query::DiedFromAnyCause {
            period: Period::new(DateWindow::unbounded(), Returning::NumericValue),
        });
        let err = builder.add("bad", spec).unwrap_err();
        assert!(matches!(err, StudyError::IncompatibleReturning { .. }));
    }

    #[test]
    fn test_category_from_uncategorised_codelist() {
        let codelist = CodeSelection::from(Codelist::new("dementia_codes", CodingSystem::Ctv3));
        let spec = VariableSpec::lookup(Query::ClinicalEvents {
            codelist,
            period: Period::new(DateWindow::unbounded(), Returning::Category),
        });
        let mut builder = VariableSetBuilder::new();
        let err = builder.add("dementia_category", spec).unwrap_err();
        assert!(matches!(
            err,
            StudyError::InvalidCategory { ref codelist, .. } if codelist == "dementia_codes"
        ));
    }

    #[test]
    fn test_check_references() {
        let mut builder = VariableSetBuilder::new();
        builder.add("has_died", flag(DateWindow::unbounded())).unwrap();
        assert!(builder.check_references("population", ["has_died"]).is_ok());
        let err = builder
            .check_references("population", ["has_died", "registered"])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Variable 'population' references undeclared variable 'registered'"
        );
    }
}
