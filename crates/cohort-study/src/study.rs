//! The study definition.
//!
//! A [`StudyDefinition`] is the artifact handed to the extraction engine: the
//! index date, default expectations, the population rule and the ordered
//! variables. [`build_study`] assembles the cohort of this study from a
//! loaded codelist catalog.

use std::io::Write;

use chrono::NaiveDate;
use cohort_loader::CodelistCatalog;
use cohort_types::{
    CodeSelection, Condition, DateBound, DateFormat, DateWindow, Expectations, Period, Query,
    Rate, RatioTable, Returning, Row, VariableSpec,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::builder::{VariableSet, VariableSetBuilder};
use crate::common_variables::{add_common_variables, fixed_date, historic_start};
use crate::config::StudyConfig;
use crate::error::{StudyError, StudyResult};
use crate::evaluate::{evaluate_output, evaluate_set};

/// Who is included in the extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    /// Hidden inputs of the condition, in evaluation order.
    pub inputs: VariableSet,
    /// Inclusion rule.
    pub condition: Condition,
}

impl Population {
    /// Returns true if the patient with raw lookup values `raw` is included.
    pub fn includes(&self, raw: &Row) -> StudyResult<bool> {
        let row = evaluate_set(&self.inputs, raw)?;
        Ok(self.condition.evaluate(&row))
    }
}

/// A complete study definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyDefinition {
    /// Date that `index_date` refers to.
    pub index_date: NaiveDate,
    /// Expectations applied to variables that declare none.
    pub default_expectations: Expectations,
    /// Inclusion rule.
    pub population: Population,
    /// Extracted variables in evaluation order.
    pub variables: VariableSet,
}

impl StudyDefinition {
    /// Serialises the definition as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> StudyResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes pretty-printed JSON to `writer`.
    pub fn write_json<W: Write>(&self, mut writer: W) -> StudyResult<()> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        Ok(())
    }

    /// Evaluates one patient.
    ///
    /// Returns `None` when the patient is outside the population, otherwise
    /// the visible variables resolved from the raw lookup values.
    pub fn evaluate(&self, raw: &Row) -> StudyResult<Option<Row>> {
        if !self.population.includes(raw)? {
            return Ok(None);
        }
        evaluate_output(&self.variables, raw).map(Some)
    }
}

/// Builds the study definition.
///
/// # Errors
/// Fails for a codelist missing from `catalog` and for any invalid variable.
pub fn build_study(config: &StudyConfig, catalog: &CodelistCatalog) -> StudyResult<StudyDefinition> {
    let index_date = DateBound::IndexDate;
    let population = build_population(&index_date)?;

    let mut builder = VariableSetBuilder::new();
    add_quality_assurance(&mut builder, catalog)?;
    add_death_dates(&mut builder, &index_date)?;
    add_fixed_covariates(&mut builder)?;
    add_common_variables(&mut builder, &index_date, catalog)?;
    let variables = builder.build();
    check_distinct_names(&population, &variables)?;

    info!(
        index_date = %config.index_date,
        variables = variables.len(),
        outputs = variables.output_names().count(),
        "built study definition"
    );

    Ok(StudyDefinition {
        index_date: config.index_date,
        default_expectations: Expectations::new()
            .date_range(historic_start()?, DateBound::Today)
            .rate(Rate::Uniform)
            .incidence(0.5)?,
        population,
        variables,
    })
}

// Population inputs and variables share one namespace in the engine.
fn check_distinct_names(population: &Population, variables: &VariableSet) -> StudyResult<()> {
    match population.inputs.names().find(|name| variables.contains(name)) {
        Some(name) => Err(StudyError::DuplicateVariable {
            name: name.to_string(),
        }),
        None => Ok(()),
    }
}

fn codes(catalog: &CodelistCatalog, name: &str) -> StudyResult<CodeSelection> {
    Ok(catalog.require(name)?.clone().into())
}

fn build_population(index_date: &DateBound) -> StudyResult<Population> {
    let mut builder = VariableSetBuilder::new();
    builder
        .add(
            "has_died",
            VariableSpec::lookup(Query::DiedFromAnyCause {
                period: Period::new(DateWindow::on_or_before(index_date.clone()), Returning::BinaryFlag),
            })
            .hidden(),
        )?
        .add(
            "registered_at_start",
            VariableSpec::lookup(Query::RegisteredAsOf {
                date: index_date.clone(),
            })
            .hidden(),
        )?
        .add(
            "registered",
            VariableSpec::satisfying(Condition::flag("registered_at_start")).hidden(),
        )?
        .add(
            "has_follow_up_previous_6months",
            VariableSpec::lookup(Query::RegisteredWithOnePracticeBetween {
                start: index_date.clone().minus_months(6),
                end: index_date.clone(),
            })
            .expecting(Expectations::new().incidence(0.95)?)
            .hidden(),
        )?;

    let condition = Condition::and([
        Condition::not(Condition::flag("has_died")),
        Condition::flag("registered"),
        Condition::flag("has_follow_up_previous_6months"),
    ]);
    builder.check_references("population", condition.references())?;

    Ok(Population {
        inputs: builder.build(),
        condition,
    })
}

fn add_quality_assurance(builder: &mut VariableSetBuilder, catalog: &CodelistCatalog) -> StudyResult<()> {
    let ever = || Period::new(DateWindow::unbounded(), Returning::BinaryFlag);

    builder.lookup(
        "prostate_cancer_snomed",
        Query::ClinicalEvents {
            codelist: codes(catalog, "prostate_cancer_snomed_clinical")?,
            period: ever(),
        },
        Expectations::new().incidence(0.03)?,
    )?;
    builder.lookup(
        "prostate_cancer_hes",
        Query::AdmittedToHospital {
            diagnoses: Some(codes(catalog, "prostate_cancer_icd10")?),
            primary_diagnosis_only: false,
            period: ever(),
        },
        Expectations::new().incidence(0.03)?,
    )?;
    builder.lookup(
        "prostate_cancer_death",
        Query::DeathCertificate {
            codelist: codes(catalog, "prostate_cancer_icd10")?,
            underlying_cause_only: false,
            period: ever(),
        },
        Expectations::new().incidence(0.02)?,
    )?;
    builder.maximum_of(
        "qa_bin_prostate_cancer",
        &["prostate_cancer_snomed", "prostate_cancer_hes", "prostate_cancer_death"],
    )?;

    builder.lookup(
        "qa_bin_pregnancy",
        Query::ClinicalEvents {
            codelist: codes(catalog, "pregnancy_snomed_clinical")?,
            period: ever(),
        },
        Expectations::new().incidence(0.03)?,
    )?;

    builder.lookup(
        "qa_num_birth_year",
        Query::DateOfBirth {
            date_format: DateFormat::Year,
        },
        Expectations::new()
            .date_range(historic_start()?, DateBound::Today)
            .rate(Rate::Uniform),
    )?;
    Ok(())
}

fn add_death_dates(builder: &mut VariableSetBuilder, index_date: &DateBound) -> StudyResult<()> {
    let after_index = || Period::new(DateWindow::on_or_after(index_date.clone()), Returning::DateOfDeath);
    let expectations = || {
        Expectations::new()
            .date_range(DateBound::IndexDate, DateBound::Today)
            .rate(Rate::ExponentialIncrease)
    };

    builder
        .lookup(
            "primary_care_death_date",
            Query::DeathInPrimaryCare {
                period: after_index(),
            },
            expectations(),
        )?
        .lookup(
            "ons_died_from_any_cause_date",
            Query::DiedFromAnyCause {
                period: after_index(),
            },
            expectations(),
        )?
        .minimum_of(
            "death_date",
            &["primary_care_death_date", "ons_died_from_any_cause_date"],
        )?;
    Ok(())
}

fn add_fixed_covariates(builder: &mut VariableSetBuilder) -> StudyResult<()> {
    builder.lookup(
        "cov_cat_sex",
        Query::Sex,
        Expectations::new()
            .rate(Rate::Universal)
            .category(RatioTable::new([("M", 0.49), ("F", 0.51)])?),
    )?;

    builder.lookup(
        "cov_num_consulation_rate",
        Query::GpConsultations {
            period: Period::new(
                DateWindow::between(fixed_date(2019, 1, 1)?, fixed_date(2019, 12, 31)?),
                Returning::NumberOfMatchesInPeriod,
            ),
        },
        Expectations::new().poisson(5.0)?,
    )?;

    builder.lookup(
        "cov_bin_healthcare_worker",
        Query::HealthcareWorkerFlag,
        Expectations::new().incidence(0.01)?,
    )?;

    builder.lookup(
        "cov_num_bmi",
        Query::MostRecentBmi {
            window: DateWindow::on_or_after(fixed_date(2010, 2, 1)?),
            minimum_age_at_measurement: 16,
            include_measurement_date: true,
        },
        Expectations::new().normal(35.0, 10.0)?.incidence(0.95)?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codelists::{fixture_catalog, study_codelists, STUDY_CODELISTS};
    use cohort_types::Value;
    use indexmap::IndexMap;
    use std::fs;
    use tempfile::TempDir;

    /// Writes one CSV per declared file, with every column the declarations
    /// of that file read.
    fn write_codelist_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let mut files: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for decl in STUDY_CODELISTS {
            let columns = files.entry(decl.path).or_insert_with(|| vec![decl.column]);
            if let Some(category) = decl.category_column {
                columns.push(category);
            }
        }

        for (path, columns) in files {
            let mut content = columns.join(",");
            content.push('\n');
            for (code, category) in [("X1", "S"), ("X2", "N")] {
                let mut row = vec![code];
                row.extend(std::iter::repeat(category).take(columns.len() - 1));
                content.push_str(&row.join(","));
                content.push('\n');
            }
            fs::write(dir.path().join(path), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_build_from_codelist_files() {
        let dir = write_codelist_dir();
        let mut catalog = CodelistCatalog::new(dir.path());
        catalog.load_all(&study_codelists()).unwrap();
        assert_eq!(catalog.len(), STUDY_CODELISTS.len());

        let study = build_study(&StudyConfig::default(), &catalog).unwrap();
        let json: serde_json::Value = serde_json::from_str(&study.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["index_date"], "2020-01-01");
        assert_eq!(json["default_expectations"]["incidence"], 0.5);
        assert!(json["population"]["inputs"]["has_died"].is_object());
        for name in ["death_date", "cov_cat_ethnicity", "cov_bin_carehome_status", "sub_date_covid19_hospital"] {
            assert!(json["variables"][name].is_object(), "missing {name}");
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_catalog_builds_same_study() {
        let dir = write_codelist_dir();
        let mut sequential = CodelistCatalog::new(dir.path());
        sequential.load_all(&study_codelists()).unwrap();
        let mut parallel = CodelistCatalog::new(dir.path());
        parallel.load_all_parallel(&study_codelists()).unwrap();

        let config = StudyConfig::default();
        assert_eq!(
            build_study(&config, &sequential).unwrap(),
            build_study(&config, &parallel).unwrap()
        );
    }

    #[test]
    fn test_study_order() {
        let study = build_study(&StudyConfig::default(), &fixture_catalog()).unwrap();
        let names: Vec<&str> = study.variables.names().take(6).collect();
        assert_eq!(
            names,
            vec![
                "prostate_cancer_snomed",
                "prostate_cancer_hes",
                "prostate_cancer_death",
                "qa_bin_prostate_cancer",
                "qa_bin_pregnancy",
                "qa_num_birth_year",
            ]
        );
        assert!(study.variables.contains("cov_num_bmi"));
        assert!(study.variables.contains("exp_date_covid19_confirmed"));
    }

    #[test]
    fn test_population() {
        let study = build_study(&StudyConfig::default(), &fixture_catalog()).unwrap();
        let population = &study.population;
        assert_eq!(
            population.condition.to_string(),
            "NOT has_died AND registered AND has_follow_up_previous_6months"
        );

        let eligible = Row::new()
            .with("has_died", false)
            .with("registered_at_start", true)
            .with("has_follow_up_previous_6months", true);
        assert!(population.includes(&eligible).unwrap());

        let died = eligible.clone().with("has_died", true);
        assert!(!population.includes(&died).unwrap());
        assert_eq!(study.evaluate(&died).unwrap(), None);
    }

    #[test]
    fn test_evaluate_patient() {
        let study = build_study(&StudyConfig::default(), &fixture_catalog()).unwrap();
        let d1 = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        let raw = Row::new()
            .with("has_died", false)
            .with("registered_at_start", true)
            .with("has_follow_up_previous_6months", true)
            .with("primary_care_death_date", d1)
            .with("prostate_cancer_hes", true);

        let row = study.evaluate(&raw).unwrap().unwrap();
        assert_eq!(row.get("death_date"), &Value::Date(d1));
        assert_eq!(row.get("qa_bin_prostate_cancer"), &Value::Bool(true));
        assert!(!row.contains("most_recent_smoking_code"));
    }

    #[test]
    fn test_missing_codelist_directory_entry() {
        let mut catalog = CodelistCatalog::default();
        for codelist in fixture_catalog().iter().filter(|c| c.name() != "pregnancy_snomed_clinical") {
            catalog.insert(codelist.clone()).unwrap();
        }
        let err = build_study(&StudyConfig::default(), &catalog).unwrap_err();
        assert_eq!(err.to_string(), "Codelist not found: pregnancy_snomed_clinical");
    }

    #[test]
    fn test_population_names_distinct_from_variables() {
        let population = build_population(&DateBound::IndexDate).unwrap();
        let study = build_study(&StudyConfig::default(), &fixture_catalog()).unwrap();
        assert!(check_distinct_names(&population, &study.variables).is_ok());

        let mut builder = VariableSetBuilder::new();
        builder
            .add("registered", VariableSpec::lookup(Query::RegisteredAsOf { date: DateBound::IndexDate }))
            .unwrap();
        let err = check_distinct_names(&population, &builder.build()).unwrap_err();
        assert!(matches!(err, StudyError::DuplicateVariable { ref name } if name == "registered"));
    }

    #[test]
    fn test_custom_index_date() {
        let index_date = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        let config = StudyConfig::default().with_index_date(index_date);
        let study = build_study(&config, &fixture_catalog()).unwrap();
        assert_eq!(study.index_date, index_date);

        let json: serde_json::Value = serde_json::from_str(&study.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["index_date"], "2021-06-01");
    }

    #[test]
    fn test_write_json() {
        let study = build_study(&StudyConfig::default(), &fixture_catalog()).unwrap();
        let mut buffer = Vec::new();
        study.write_json(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\"cov_num_consulation_rate\""));
    }
}
