//! Variable specifications.
//!
//! A [`VariableSpec`] names how one output column is resolved: a direct
//! [`Query`] against the health record, an aggregate over earlier variables,
//! a category dictionary or a boolean population rule.

use std::fmt;

use crate::{
    CategoryDictionary, CodeSelection, Condition, DateBound, DateWindow, Expectations, ValueKind,
};

/// What a lookup returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Returning {
    /// Whether any match exists.
    BinaryFlag,
    /// Date of the selected match.
    Date,
    /// Admission date of the selected hospital episode.
    DateAdmitted,
    /// Date of death.
    DateOfDeath,
    /// Number of matches in the window.
    NumberOfMatchesInPeriod,
    /// Recorded value of the selected match.
    NumericValue,
    /// Category of the matched code.
    Category,
}

impl Returning {
    /// The kind of value this produces.
    pub fn kind(self) -> ValueKind {
        match self {
            Self::BinaryFlag => ValueKind::Bool,
            Self::Date | Self::DateAdmitted | Self::DateOfDeath => ValueKind::Date,
            Self::NumberOfMatchesInPeriod | Self::NumericValue => ValueKind::Number,
            Self::Category => ValueKind::Category,
        }
    }

    /// The engine's name for this return type.
    pub fn name(self) -> &'static str {
        match self {
            Self::BinaryFlag => "binary_flag",
            Self::Date => "date",
            Self::DateAdmitted => "date_admitted",
            Self::DateOfDeath => "date_of_death",
            Self::NumberOfMatchesInPeriod => "number_of_matches_in_period",
            Self::NumericValue => "numeric_value",
            Self::Category => "category",
        }
    }
}

impl fmt::Display for Returning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Precision of returned dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DateFormat {
    /// Year only.
    #[cfg_attr(feature = "serde", serde(rename = "YYYY"))]
    Year,
    /// Year and month.
    #[cfg_attr(feature = "serde", serde(rename = "YYYY-MM"))]
    YearMonth,
    /// Full date.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "YYYY-MM-DD"))]
    YearMonthDay,
}

/// Which match in the window is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FindMatch {
    /// Earliest match.
    First,
    /// Latest match.
    #[default]
    Last,
}

/// Result filter for laboratory tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TestResult {
    /// Positive results only.
    Positive,
    /// Negative results only.
    Negative,
    /// Any result.
    Any,
}

/// The part of a lookup shared by every period-based primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Period {
    /// Date window matches must fall into.
    pub window: DateWindow,
    /// What to return.
    pub returning: Returning,
    /// Which match to use.
    pub find: FindMatch,
    /// Date precision, for date returns.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub date_format: Option<DateFormat>,
}

impl Period {
    /// A period returning `returning` from matches in `window`.
    ///
    /// Date returns default to full `YYYY-MM-DD` precision.
    pub fn new(window: DateWindow, returning: Returning) -> Self {
        let date_format = (returning.kind() == ValueKind::Date).then_some(DateFormat::YearMonthDay);
        Self {
            window,
            returning,
            find: FindMatch::default(),
            date_format,
        }
    }

    /// Uses the earliest match.
    pub fn first(mut self) -> Self {
        self.find = FindMatch::First;
        self
    }

    /// Uses the latest match.
    pub fn last(mut self) -> Self {
        self.find = FindMatch::Last;
        self
    }

    /// Sets the date precision.
    pub fn date_format(mut self, format: DateFormat) -> Self {
        self.date_format = Some(format);
        self
    }
}

/// Engine lookup primitives.
///
/// These are black boxes executed by the extraction engine. Each variant
/// records the arguments the engine needs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "query", rename_all = "snake_case"))]
pub enum Query {
    /// Coded events in the primary care record.
    ClinicalEvents {
        /// Codes to match.
        codelist: CodeSelection,
        /// Window and return type.
        period: Period,
    },
    /// Prescribed medications.
    Medications {
        /// Medicine codes to match.
        codelist: CodeSelection,
        /// Window and return type.
        period: Period,
    },
    /// Hospital admissions (HES APC).
    AdmittedToHospital {
        /// Diagnosis codes; any admission when absent.
        #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
        diagnoses: Option<CodeSelection>,
        /// Match primary diagnoses only.
        primary_diagnosis_only: bool,
        /// Window and return type.
        period: Period,
    },
    /// Laboratory test results from SGSS.
    TestResultInSgss {
        /// Pathogen tested for.
        pathogen: String,
        /// Result filter.
        test_result: TestResult,
        /// Window and return type.
        period: Period,
    },
    /// Codes on the ONS death certificate.
    DeathCertificate {
        /// Cause-of-death codes.
        codelist: CodeSelection,
        /// Match the underlying cause only.
        underlying_cause_only: bool,
        /// Window and return type.
        period: Period,
    },
    /// ONS death from any cause.
    DiedFromAnyCause {
        /// Window and return type.
        period: Period,
    },
    /// Death recorded in primary care.
    DeathInPrimaryCare {
        /// Window and return type.
        period: Period,
    },
    /// Registered with a practice on a date.
    RegisteredAsOf {
        /// Reference date.
        date: DateBound,
    },
    /// Continuously registered with one practice.
    RegisteredWithOnePracticeBetween {
        /// Start of registration.
        start: DateBound,
        /// End of registration.
        end: DateBound,
    },
    /// Recorded sex.
    Sex,
    /// Age in whole years.
    AgeAsOf {
        /// Reference date.
        date: DateBound,
    },
    /// Date of birth.
    DateOfBirth {
        /// Date precision.
        date_format: DateFormat,
    },
    /// Index of multiple deprivation of the registered address.
    AddressAsOf {
        /// Reference date.
        date: DateBound,
        /// Rounding applied by the engine.
        #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
        round_to_nearest: Option<u32>,
    },
    /// NUTS1 region of the registered practice.
    RegisteredPracticeAsOf {
        /// Reference date.
        date: DateBound,
    },
    /// Ethnicity recorded in secondary care.
    EthnicityFromSus {
        /// Number of ethnicity groups (6 or 16).
        groups: u8,
        /// Use the most frequent code rather than the latest.
        use_most_frequent_code: bool,
    },
    /// Care home status of the registered address.
    ///
    /// The dictionary conditions refer to address attributes, not to study
    /// variables.
    CareHomeStatusAsOf {
        /// Reference date.
        date: DateBound,
        /// Categorisation of address attributes.
        categories: CategoryDictionary,
    },
    /// GP consultations.
    GpConsultations {
        /// Window and return type.
        period: Period,
    },
    /// Most recent body mass index.
    MostRecentBmi {
        /// Window of measurements.
        window: DateWindow,
        /// Minimum age at measurement.
        minimum_age_at_measurement: u32,
        /// Also return the measurement date.
        include_measurement_date: bool,
    },
    /// Healthcare worker flag on the vaccination record.
    HealthcareWorkerFlag,
}

impl Query {
    /// The engine function implementing this primitive.
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::ClinicalEvents { .. } => "with_these_clinical_events",
            Self::Medications { .. } => "with_these_medications",
            Self::AdmittedToHospital { .. } => "admitted_to_hospital",
            Self::TestResultInSgss { .. } => "with_test_result_in_sgss",
            Self::DeathCertificate { .. } => "with_these_codes_on_death_certificate",
            Self::DiedFromAnyCause { .. } => "died_from_any_cause",
            Self::DeathInPrimaryCare { .. } => "with_death_recorded_in_primary_care",
            Self::RegisteredAsOf { .. } => "registered_as_of",
            Self::RegisteredWithOnePracticeBetween { .. } => "registered_with_one_practice_between",
            Self::Sex => "sex",
            Self::AgeAsOf { .. } => "age_as_of",
            Self::DateOfBirth { .. } => "date_of_birth",
            Self::AddressAsOf { .. } => "address_as_of",
            Self::RegisteredPracticeAsOf { .. } => "registered_practice_as_of",
            Self::EthnicityFromSus { .. } => "with_ethnicity_from_sus",
            Self::CareHomeStatusAsOf { .. } => "care_home_status_as_of",
            Self::GpConsultations { .. } => "with_gp_consultations",
            Self::MostRecentBmi { .. } => "most_recent_bmi",
            Self::HealthcareWorkerFlag => "with_healthcare_worker_flag_on_covid_vaccine_record",
        }
    }

    /// The period of a period-based primitive.
    pub fn period(&self) -> Option<&Period> {
        match self {
            Self::ClinicalEvents { period, .. }
            | Self::Medications { period, .. }
            | Self::AdmittedToHospital { period, .. }
            | Self::TestResultInSgss { period, .. }
            | Self::DeathCertificate { period, .. }
            | Self::DiedFromAnyCause { period }
            | Self::DeathInPrimaryCare { period }
            | Self::GpConsultations { period } => Some(period),
            _ => None,
        }
    }

    /// The codes this lookup matches against, if any.
    pub fn codelist(&self) -> Option<&CodeSelection> {
        match self {
            Self::ClinicalEvents { codelist, .. }
            | Self::Medications { codelist, .. }
            | Self::DeathCertificate { codelist, .. } => Some(codelist),
            Self::AdmittedToHospital { diagnoses, .. } => diagnoses.as_ref(),
            _ => None,
        }
    }

    /// What this lookup returns.
    pub fn returning(&self) -> Returning {
        if let Some(period) = self.period() {
            return period.returning;
        }
        match self {
            Self::RegisteredAsOf { .. }
            | Self::RegisteredWithOnePracticeBetween { .. }
            | Self::HealthcareWorkerFlag => Returning::BinaryFlag,
            Self::AgeAsOf { .. } | Self::AddressAsOf { .. } | Self::MostRecentBmi { .. } => {
                Returning::NumericValue
            }
            Self::DateOfBirth { .. } => Returning::Date,
            _ => Returning::Category,
        }
    }

    /// Return types the primitive can produce.
    pub fn supported_returning(&self) -> &'static [Returning] {
        use Returning::*;
        match self {
            Self::ClinicalEvents { .. } => &[
                BinaryFlag,
                Date,
                NumberOfMatchesInPeriod,
                NumericValue,
                Category,
            ],
            Self::Medications { .. } => &[BinaryFlag, Date, NumberOfMatchesInPeriod],
            Self::AdmittedToHospital { .. } => &[BinaryFlag, DateAdmitted, NumberOfMatchesInPeriod],
            Self::TestResultInSgss { .. } => &[BinaryFlag, Date],
            Self::DeathCertificate { .. }
            | Self::DiedFromAnyCause { .. }
            | Self::DeathInPrimaryCare { .. } => &[BinaryFlag, DateOfDeath],
            Self::GpConsultations { .. } => &[BinaryFlag, NumberOfMatchesInPeriod],
            Self::RegisteredAsOf { .. }
            | Self::RegisteredWithOnePracticeBetween { .. }
            | Self::HealthcareWorkerFlag => &[BinaryFlag],
            Self::AgeAsOf { .. } | Self::AddressAsOf { .. } | Self::MostRecentBmi { .. } => {
                &[NumericValue]
            }
            Self::DateOfBirth { .. } => &[Date],
            Self::Sex
            | Self::RegisteredPracticeAsOf { .. }
            | Self::EthnicityFromSus { .. }
            | Self::CareHomeStatusAsOf { .. } => &[Category],
        }
    }

    /// Returns true if the primitive can produce its declared return type.
    pub fn returning_supported(&self) -> bool {
        self.supported_returning().contains(&self.returning())
    }

    /// Date windows and bounds this lookup uses.
    pub fn windows(&self) -> Vec<DateWindow> {
        if let Some(period) = self.period() {
            return vec![period.window.clone()];
        }
        match self {
            Self::RegisteredAsOf { date }
            | Self::AgeAsOf { date }
            | Self::AddressAsOf { date, .. }
            | Self::RegisteredPracticeAsOf { date }
            | Self::CareHomeStatusAsOf { date, .. } => {
                vec![DateWindow::on_or_before(date.clone())]
            }
            Self::RegisteredWithOnePracticeBetween { start, end } => {
                vec![DateWindow::between(start.clone(), end.clone())]
            }
            Self::MostRecentBmi { window, .. } => vec![window.clone()],
            _ => Vec::new(),
        }
    }

    /// Variable names the lookup's dates depend on.
    pub fn references(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for window in self.windows() {
            for name in window.references() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }
}

/// How a variable is resolved.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Rule {
    /// A direct lookup.
    Lookup(Query),
    /// Earliest date or smallest number among the inputs.
    MinimumOf(Vec<String>),
    /// Any-true flag, latest date or largest number among the inputs.
    MaximumOf(Vec<String>),
    /// First matching category.
    CategorisedAs(CategoryDictionary),
    /// Boolean population rule.
    Satisfying(Condition),
}

impl Rule {
    /// The engine function implementing this rule.
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::Lookup(query) => query.engine_name(),
            Self::MinimumOf(_) => "minimum_of",
            Self::MaximumOf(_) => "maximum_of",
            Self::CategorisedAs(_) => "categorised_as",
            Self::Satisfying(_) => "satisfying",
        }
    }

    /// Variable names the rule reads, in first-use order.
    pub fn references(&self) -> Vec<String> {
        match self {
            Self::Lookup(query) => query.references(),
            Self::MinimumOf(inputs) | Self::MaximumOf(inputs) => {
                let mut names: Vec<String> = Vec::with_capacity(inputs.len());
                for input in inputs {
                    if !names.contains(input) {
                        names.push(input.clone());
                    }
                }
                names
            }
            Self::CategorisedAs(dictionary) => {
                dictionary.references().into_iter().map(String::from).collect()
            }
            Self::Satisfying(condition) => {
                condition.references().into_iter().map(String::from).collect()
            }
        }
    }
}

/// A named output field: its rule, expectations and visibility.
///
/// # Examples
///
/// ```
/// use cohort_types::{Expectations, VariableSpec};
///
/// let death_date = VariableSpec::minimum_of(["primary_care_death_date", "ons_death_date"]);
/// assert_eq!(death_date.references(), vec!["primary_care_death_date", "ons_death_date"]);
/// assert!(!death_date.hidden);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableSpec {
    /// Resolution rule.
    pub rule: Rule,
    /// Synthetic-data hints.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Expectations::is_empty"))]
    pub expectations: Expectations,
    /// Excluded from the output dataset.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "std::ops::Not::not"))]
    pub hidden: bool,
}

impl VariableSpec {
    /// A spec with the given rule.
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            expectations: Expectations::default(),
            hidden: false,
        }
    }

    /// A direct lookup.
    pub fn lookup(query: Query) -> Self {
        Self::new(Rule::Lookup(query))
    }

    /// `minimum_of(inputs...)`.
    pub fn minimum_of<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Rule::MinimumOf(inputs.into_iter().map(Into::into).collect()))
    }

    /// `maximum_of(inputs...)`.
    pub fn maximum_of<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Rule::MaximumOf(inputs.into_iter().map(Into::into).collect()))
    }

    /// `categorised_as(dictionary)`.
    pub fn categorised_as(dictionary: CategoryDictionary) -> Self {
        Self::new(Rule::CategorisedAs(dictionary))
    }

    /// `satisfying(condition)`.
    pub fn satisfying(condition: Condition) -> Self {
        Self::new(Rule::Satisfying(condition))
    }

    /// Attaches expectations.
    pub fn expecting(mut self, expectations: Expectations) -> Self {
        self.expectations = expectations;
        self
    }

    /// Marks the variable hidden.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Variable names this spec reads.
    pub fn references(&self) -> Vec<String> {
        self.rule.references()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CategoryRule, Codelist, CodingSystem};

    fn codes() -> CodeSelection {
        CodeSelection::from(Codelist::new("covid_codes", CodingSystem::Icd10))
    }

    #[test]
    fn test_returning_kind() {
        assert_eq!(Returning::DateAdmitted.kind(), ValueKind::Date);
        assert_eq!(Returning::NumberOfMatchesInPeriod.kind(), ValueKind::Number);
        assert_eq!(Returning::BinaryFlag.to_string(), "binary_flag");
    }

    #[test]
    fn test_period_defaults() {
        let period = Period::new(DateWindow::unbounded(), Returning::Date);
        assert_eq!(period.date_format, Some(DateFormat::YearMonthDay));
        assert_eq!(period.find, FindMatch::Last);
        let flag = Period::new(DateWindow::unbounded(), Returning::BinaryFlag).first();
        assert_eq!(flag.date_format, None);
        assert_eq!(flag.find, FindMatch::First);
    }

    #[test]
    fn test_supported_returning() {
        let hes = Query::AdmittedToHospital {
            diagnoses: Some(codes()),
            primary_diagnosis_only: false,
            period: Period::new(DateWindow::unbounded(), Returning::DateAdmitted),
        };
        assert!(hes.returning_supported());

        let bad = Query::DeathCertificate {
            codelist: codes(),
            underlying_cause_only: true,
            period: Period::new(DateWindow::unbounded(), Returning::NumericValue),
        };
        assert!(!bad.returning_supported());
        assert!(Query::Sex.returning_supported());
        assert_eq!(Query::Sex.returning(), Returning::Category);
    }

    #[test]
    fn test_query_references() {
        let hospital = Query::AdmittedToHospital {
            diagnoses: Some(codes()),
            primary_diagnosis_only: true,
            period: Period::new(
                DateWindow::on_or_after(DateBound::variable("exp_date_covid19_confirmed")),
                Returning::DateAdmitted,
            ),
        };
        assert_eq!(hospital.references(), vec!["exp_date_covid19_confirmed"]);
        assert!(Query::AgeAsOf { date: DateBound::IndexDate }.references().is_empty());
    }

    #[test]
    fn test_care_home_dictionary_is_not_a_reference() {
        let categories = CategoryDictionary::from_rules(vec![
            CategoryRule::when("Yes", Condition::flag("IsPotentialCareHome")),
            CategoryRule::otherwise("No"),
        ])
        .unwrap();
        let query = Query::CareHomeStatusAsOf {
            date: DateBound::IndexDate,
            categories,
        };
        assert!(VariableSpec::lookup(query).references().is_empty());
    }

    #[test]
    fn test_rule_references() {
        let spec = VariableSpec::maximum_of(["a", "b", "a"]);
        assert_eq!(spec.references(), vec!["a", "b"]);
        assert_eq!(spec.rule.engine_name(), "maximum_of");

        let population = VariableSpec::satisfying(Condition::and([
            Condition::not(Condition::flag("has_died")),
            Condition::flag("registered"),
        ]));
        assert_eq!(population.references(), vec!["has_died", "registered"]);
    }
}
