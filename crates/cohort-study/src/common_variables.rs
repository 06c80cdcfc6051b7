//! Exposure, outcome, covariate and subgroup variables.
//!
//! These variables depend on one index date, passed as a [`DateBound`]
//! (normally [`DateBound::IndexDate`]). Event flags recorded in several data
//! sources are declared once per source as `tmp_` variables and merged with
//! `maximum_of`; the earliest confirmed COVID-19 date is merged with
//! `minimum_of`.

use cohort_loader::CodelistCatalog;
use cohort_types::{
    CategoryDictionary, CategoryRule, CodeSelection, Condition, DateBound, DateWindow,
    Expectations, Period, Query, Rate, RatioTable, Returning, TestResult, VariableSpec,
};
use tracing::debug;

use crate::builder::{VariableSet, VariableSetBuilder};
use crate::error::{StudyError, StudyResult};
use crate::helpers::{
    generate_deprivation_ntile_dictionary, generate_ethnicity_dictionary,
    generate_universal_expectations, DEPRIVATION_SOURCE,
};

/// Where an event is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Primary care record.
    PrimaryCare,
    /// Hospital admissions.
    Hospital,
    /// Prescribed medicines.
    Medicines,
}

impl Source {
    fn suffix(self) -> &'static str {
        match self {
            Self::PrimaryCare => "snomed",
            Self::Hospital => "hes",
            Self::Medicines => "dmd",
        }
    }

    fn date_returning(self) -> Returning {
        match self {
            Self::Hospital => Returning::DateAdmitted,
            Self::PrimaryCare | Self::Medicines => Returning::Date,
        }
    }
}

/// Builds lookups against catalog codelists.
struct Lookups<'a> {
    catalog: &'a CodelistCatalog,
}

impl Lookups<'_> {
    fn codes(&self, name: &str) -> StudyResult<CodeSelection> {
        Ok(self.catalog.require(name)?.clone().into())
    }

    fn query(&self, source: Source, codelist: &str, period: Period) -> StudyResult<Query> {
        let codelist = self.codes(codelist)?;
        Ok(match source {
            Source::PrimaryCare => Query::ClinicalEvents { codelist, period },
            Source::Hospital => Query::AdmittedToHospital {
                diagnoses: Some(codelist),
                primary_diagnosis_only: false,
                period,
            },
            Source::Medicines => Query::Medications { codelist, period },
        })
    }
}

/// Outcome recorded from the index date onwards.
struct Outcome {
    stem: &'static str,
    sources: &'static [(Source, &'static str)],
    counted: bool,
}

const OUTCOMES: &[Outcome] = &[
    Outcome {
        stem: "dm_type1",
        sources: &[
            (Source::PrimaryCare, "diabetes_type1_snomed"),
            (Source::Hospital, "diabetes_type1_icd10"),
        ],
        counted: true,
    },
    Outcome {
        stem: "dm_type2",
        sources: &[
            (Source::PrimaryCare, "diabetes_type2_snomed"),
            (Source::Hospital, "diabetes_type2_icd10"),
        ],
        counted: true,
    },
    Outcome {
        stem: "dm_other",
        sources: &[(Source::PrimaryCare, "diabetes_other_snomed")],
        counted: true,
    },
    Outcome {
        stem: "dm_gestational",
        sources: &[(Source::PrimaryCare, "diabetes_gestational_snomed")],
        counted: false,
    },
    Outcome {
        stem: "dm_diagnostic",
        sources: &[(Source::PrimaryCare, "diabetes_diagnostic_snomed")],
        counted: true,
    },
];

/// History flag recorded on or before the index date.
enum History {
    /// One lookup declared under the output name.
    Single {
        output: &'static str,
        source: Source,
        codelist: &'static str,
    },
    /// One `tmp_` flag per source merged with `maximum_of`.
    AnySource {
        output: &'static str,
        inputs: &'static [(&'static str, Source, &'static str)],
        combined: &'static [&'static str],
    },
}

const HISTORY: &[History] = &[
    History::AnySource {
        output: "cov_bin_ami",
        inputs: &[
            ("tmp_cov_bin_ami_snomed", Source::PrimaryCare, "ami_snomed_clinical"),
            ("tmp_cov_bin_ami_prior_hes", Source::Hospital, "ami_prior_icd10"),
            ("tmp_cov_bin_ami_hes", Source::Hospital, "ami_icd10"),
        ],
        combined: &["tmp_cov_bin_ami_snomed", "tmp_cov_bin_ami_prior_hes", "tmp_cov_bin_ami_hes"],
    },
    History::AnySource {
        output: "cov_bin_all_stroke",
        inputs: &[
            ("tmp_cov_bin_stroke_isch_snomed", Source::PrimaryCare, "stroke_isch_snomed_clinical"),
            ("tmp_cov_bin_stroke_sah_hs_snomed", Source::PrimaryCare, "stroke_sah_hs_snomed_clinical"),
            ("tmp_cov_bin_stroke_isch_hes", Source::Hospital, "stroke_isch_icd10"),
            ("tmp_cov_bin_stroke_sah_hs_hes", Source::Hospital, "stroke_sah_hs_icd10"),
        ],
        combined: &[
            "tmp_cov_bin_stroke_isch_hes",
            "tmp_cov_bin_stroke_isch_snomed",
            "tmp_cov_bin_stroke_sah_hs_hes",
            "tmp_cov_bin_stroke_sah_hs_snomed",
        ],
    },
    History::Single {
        output: "cov_bin_other_arterial_embolism",
        source: Source::Hospital,
        codelist: "other_arterial_embolism_icd10",
    },
    History::AnySource {
        output: "cov_bin_vte",
        inputs: &[
            ("tmp_cov_bin_vte_snomed", Source::PrimaryCare, "all_vte_codes_snomed_clinical"),
            ("tmp_cov_bin_vte_hes", Source::Hospital, "all_vte_codes_icd10"),
        ],
        combined: &["tmp_cov_bin_vte_snomed", "tmp_cov_bin_vte_hes"],
    },
    History::AnySource {
        output: "cov_bin_hf",
        inputs: &[
            ("tmp_cov_bin_hf_snomed", Source::PrimaryCare, "hf_snomed_clinical"),
            ("tmp_cov_bin_hf_hes", Source::Hospital, "hf_icd10"),
        ],
        combined: &["tmp_cov_bin_hf_snomed", "tmp_cov_bin_hf_hes"],
    },
    History::AnySource {
        output: "cov_bin_angina",
        inputs: &[
            ("tmp_cov_bin_angina_snomed", Source::PrimaryCare, "angina_snomed_clinical"),
            ("tmp_cov_bin_angina_hes", Source::Hospital, "angina_icd10"),
        ],
        combined: &["tmp_cov_bin_angina_snomed", "tmp_cov_bin_angina_hes"],
    },
    History::AnySource {
        output: "cov_bin_dementia",
        inputs: &[
            ("tmp_cov_bin_dementia_snomed", Source::PrimaryCare, "dementia_snomed_clinical"),
            ("tmp_cov_bin_dementia_hes", Source::Hospital, "dementia_icd10"),
            ("tmp_cov_bin_dementia_vascular_snomed", Source::PrimaryCare, "dementia_vascular_snomed_clinical"),
            ("tmp_cov_bin_dementia_vascular_hes", Source::Hospital, "dementia_vascular_icd10"),
        ],
        combined: &[
            "tmp_cov_bin_dementia_snomed",
            "tmp_cov_bin_dementia_hes",
            "tmp_cov_bin_dementia_vascular_snomed",
            "tmp_cov_bin_dementia_vascular_hes",
        ],
    },
    History::AnySource {
        output: "cov_bin_liver_disease",
        inputs: &[
            ("tmp_cov_bin_liver_disease_snomed", Source::PrimaryCare, "liver_disease_snomed_clinical"),
            ("tmp_cov_bin_liver_disease_hes", Source::Hospital, "liver_disease_icd10"),
        ],
        combined: &["tmp_cov_bin_liver_disease_snomed", "tmp_cov_bin_liver_disease_hes"],
    },
    History::AnySource {
        output: "cov_bin_chronic_kidney_disease",
        inputs: &[
            ("tmp_cov_bin_chronic_kidney_disease_snomed", Source::PrimaryCare, "ckd_snomed_clinical"),
            ("tmp_cov_bin_chronic_kidney_disease_hes", Source::Hospital, "ckd_icd10"),
        ],
        combined: &[
            "tmp_cov_bin_chronic_kidney_disease_snomed",
            "tmp_cov_bin_chronic_kidney_disease_hes",
        ],
    },
    History::AnySource {
        output: "cov_bin_cancer",
        inputs: &[
            ("tmp_cov_bin_cancer_snomed", Source::PrimaryCare, "cancer_snomed_clinical"),
            ("tmp_cov_bin_cancer_hes", Source::Hospital, "cancer_icd10"),
        ],
        combined: &["tmp_cov_bin_cancer_snomed", "tmp_cov_bin_cancer_hes"],
    },
    History::AnySource {
        output: "cov_bin_hypertension",
        inputs: &[
            ("tmp_cov_bin_hypertension_snomed", Source::PrimaryCare, "hypertension_snomed_clinical"),
            ("tmp_cov_bin_hypertension_hes", Source::Hospital, "hypertension_icd10"),
            ("tmp_cov_bin_hypertension_drugs_dmd", Source::Medicines, "hypertension_drugs_dmd"),
        ],
        combined: &[
            "tmp_cov_bin_hypertension_snomed",
            "tmp_cov_bin_hypertension_hes",
            "tmp_cov_bin_hypertension_drugs_dmd",
        ],
    },
    History::AnySource {
        output: "cov_bin_obesity",
        inputs: &[
            ("tmp_cov_bin_obesity_snomed", Source::PrimaryCare, "bmi_obesity_snomed_clinical"),
            ("tmp_cov_bin_obesity_hes", Source::Hospital, "bmi_obesity_icd10"),
        ],
        combined: &["tmp_cov_bin_obesity_snomed", "tmp_cov_bin_obesity_hes"],
    },
    History::AnySource {
        output: "cov_bin_depression",
        inputs: &[
            ("tmp_cov_bin_depression_snomed", Source::PrimaryCare, "depression_snomed_clinical"),
            ("tmp_cov_bin_depression_hes", Source::Hospital, "depression_icd10"),
        ],
        combined: &["tmp_cov_bin_depression_snomed", "tmp_cov_bin_depression_hes"],
    },
    History::AnySource {
        output: "cov_bin_chronic_obstructive_pulmonary_disease",
        inputs: &[
            (
                "tmp_cov_bin_chronic_obstructive_pulmonary_disease_snomed",
                Source::PrimaryCare,
                "copd_snomed_clinical",
            ),
            (
                "tmp_cov_bin_chronic_obstructive_pulmonary_disease_hes",
                Source::Hospital,
                "copd_icd10",
            ),
        ],
        combined: &[
            "tmp_cov_bin_chronic_obstructive_pulmonary_disease_snomed",
            "tmp_cov_bin_chronic_obstructive_pulmonary_disease_hes",
        ],
    },
    History::Single {
        output: "cov_bin_lipid_medications_dmd",
        source: Source::Medicines,
        codelist: "lipid_lowering_dmd",
    },
    History::Single {
        output: "cov_bin_antiplatelet_medications",
        source: Source::Medicines,
        codelist: "antiplatelet_dmd",
    },
    History::Single {
        output: "cov_bin_anticoagulation_medications",
        source: Source::Medicines,
        codelist: "anticoagulant_dmd",
    },
    History::Single {
        output: "cov_bin_combined_oral_contraceptive_pill",
        source: Source::Medicines,
        codelist: "cocp_dmd",
    },
    History::Single {
        output: "cov_bin_hormone_replacement_therapy",
        source: Source::Medicines,
        codelist: "hrt_dmd",
    },
];

/// Earliest plausible date of a historic record.
pub(crate) fn historic_start() -> StudyResult<DateBound> {
    fixed_date(1900, 1, 1)
}

pub(crate) fn fixed_date(year: i32, month: u32, day: u32) -> StudyResult<DateBound> {
    DateBound::ymd(year, month, day).ok_or_else(|| StudyError::InvalidDate {
        value: format!("{year:04}-{month:02}-{day:02}"),
    })
}

fn since_index(incidence: f64) -> StudyResult<Expectations> {
    Ok(Expectations::new()
        .date_range(DateBound::IndexDate, DateBound::Today)
        .rate(Rate::Uniform)
        .incidence(incidence)?)
}

fn historic(incidence: f64) -> StudyResult<Expectations> {
    Ok(Expectations::new()
        .date_range(historic_start()?, DateBound::Today)
        .rate(Rate::Uniform)
        .incidence(incidence)?)
}

/// Builds the common variables relative to `index_date`.
///
/// # Errors
/// Fails with [`cohort_loader::CodelistError::CodelistNotFound`] (wrapped in
/// [`StudyError::Codelist`]) for a codelist missing from `catalog`, and with
/// any validation error of [`VariableSetBuilder::add`].
pub fn generate_variables(index_date: &DateBound, catalog: &CodelistCatalog) -> StudyResult<VariableSet> {
    let mut builder = VariableSetBuilder::new();
    add_common_variables(&mut builder, index_date, catalog)?;
    Ok(builder.build())
}

/// Appends the common variables to `builder`.
pub fn add_common_variables(
    builder: &mut VariableSetBuilder,
    index_date: &DateBound,
    catalog: &CodelistCatalog,
) -> StudyResult<()> {
    let lookups = Lookups { catalog };
    let before = builder.declared().len();

    add_exposures(builder, &lookups, index_date)?;
    add_outcomes(builder, &lookups, index_date)?;
    add_demographics(builder, &lookups, index_date)?;
    add_history(builder, &lookups, index_date)?;
    add_subgroups(builder, &lookups)?;

    debug!(
        index_date = %index_date,
        variables = builder.declared().len() - before,
        "added common variables"
    );
    Ok(())
}

fn add_exposures(
    builder: &mut VariableSetBuilder,
    lookups: &Lookups<'_>,
    index_date: &DateBound,
) -> StudyResult<()> {
    let from_index = || DateWindow::on_or_after(index_date.clone());

    builder.lookup(
        "tmp_exp_date_covid19_confirmed_sgss",
        Query::TestResultInSgss {
            pathogen: "SARS-CoV-2".to_string(),
            test_result: TestResult::Positive,
            period: Period::new(from_index(), Returning::Date).first(),
        },
        since_index(0.05)?,
    )?;

    let any_primary_care_code = lookups.catalog.combine(&[
        "covid_primary_care_code",
        "covid_primary_care_positive_test",
        "covid_primary_care_sequalae",
    ])?;
    builder.lookup(
        "tmp_exp_date_covid19_confirmed_snomed",
        Query::ClinicalEvents {
            codelist: any_primary_care_code.into(),
            period: Period::new(from_index(), Returning::Date).first(),
        },
        since_index(0.05)?,
    )?;

    builder.lookup(
        "tmp_exp_date_covid19_confirmed_hes",
        lookups.query(
            Source::Hospital,
            "covid_codes",
            Period::new(from_index(), Returning::DateAdmitted).first(),
        )?,
        since_index(0.05)?,
    )?;

    builder.lookup(
        "tmp_exp_date_covid19_confirmed_death",
        Query::DeathCertificate {
            codelist: lookups.codes("covid_codes")?,
            underlying_cause_only: true,
            period: Period::new(from_index(), Returning::DateOfDeath),
        },
        since_index(0.02)?,
    )?;

    builder.minimum_of(
        "exp_date_covid19_confirmed",
        &[
            "tmp_exp_date_covid19_confirmed_sgss",
            "tmp_exp_date_covid19_confirmed_snomed",
            "tmp_exp_date_covid19_confirmed_hes",
            "tmp_exp_date_covid19_confirmed_death",
        ],
    )?;
    Ok(())
}

fn add_outcomes(
    builder: &mut VariableSetBuilder,
    lookups: &Lookups<'_>,
    index_date: &DateBound,
) -> StudyResult<()> {
    let follow_up = || DateWindow::between(index_date.clone(), DateBound::Today);

    for outcome in OUTCOMES {
        for &(source, codelist) in outcome.sources {
            builder.lookup(
                format!("tmp_out_date_{}_{}", outcome.stem, source.suffix()),
                lookups.query(source, codelist, Period::new(follow_up(), source.date_returning()).first())?,
                historic(0.03)?,
            )?;
        }
        if !outcome.counted {
            continue;
        }
        for &(source, codelist) in outcome.sources {
            builder.lookup(
                format!("tmp_out_count_{}_{}", outcome.stem, source.suffix()),
                lookups.query(
                    source,
                    codelist,
                    Period::new(follow_up(), Returning::NumberOfMatchesInPeriod),
                )?,
                Expectations::new().poisson(2.0)?,
            )?;
        }
    }

    builder.lookup(
        "temp_cov_num_latest_hba1c",
        lookups.query(
            Source::PrimaryCare,
            "hba1c_codes",
            Period::new(follow_up(), Returning::NumericValue).last(),
        )?,
        Expectations::new(),
    )?;
    builder.lookup(
        "temp_cov_date_latest_hba1c",
        lookups.query(
            Source::PrimaryCare,
            "hba1c_codes",
            Period::new(follow_up(), Returning::Date).last(),
        )?,
        historic(0.03)?,
    )?;
    builder.lookup(
        "temp_cov_date_dm_drugs_dmd",
        lookups.query(
            Source::Medicines,
            "diabetes_drugs_dmd",
            Period::new(follow_up(), Returning::Date).first(),
        )?,
        historic(0.03)?,
    )?;
    Ok(())
}

fn add_demographics(
    builder: &mut VariableSetBuilder,
    lookups: &Lookups<'_>,
    index_date: &DateBound,
) -> StudyResult<()> {
    let history = || DateWindow::on_or_before(index_date.clone());

    builder.lookup(
        "cov_num_age",
        Query::AgeAsOf {
            date: index_date.clone(),
        },
        Expectations::new()
            .rate(Rate::Universal)
            .population_ages()
            .incidence(0.001)?,
    )?;

    // Ethnicity: GP record first, then secondary care.
    let latest_ethnicity = |codelist: &str, returning: Returning| -> StudyResult<VariableSpec> {
        Ok(VariableSpec::lookup(lookups.query(
            Source::PrimaryCare,
            codelist,
            Period::new(history(), returning).last(),
        )?))
    };
    builder.categorised_as_dictionary(
        "cov_cat_ethnicity",
        generate_ethnicity_dictionary(6)?,
        vec![
            (
                "cov_ethnicity_sus".to_string(),
                VariableSpec::lookup(Query::EthnicityFromSus {
                    groups: 6,
                    use_most_frequent_code: true,
                }),
            ),
            (
                "cov_ethnicity_gp_opensafely".to_string(),
                latest_ethnicity("opensafely_ethnicity_codes_6", Returning::Category)?,
            ),
            (
                "cov_ethnicity_gp_primis".to_string(),
                latest_ethnicity("primis_covid19_vacc_update_ethnicity", Returning::Category)?,
            ),
            (
                "cov_ethnicity_gp_opensafely_date".to_string(),
                latest_ethnicity("opensafely_ethnicity_codes_6", Returning::Date)?,
            ),
            (
                "cov_ethnicity_gp_primis_date".to_string(),
                latest_ethnicity("primis_covid19_vacc_update_ethnicity", Returning::Date)?,
            ),
        ],
        generate_universal_expectations(6, false)?,
    )?;

    builder.categorised_as_dictionary(
        "cov_cat_deprivation",
        generate_deprivation_ntile_dictionary(10)?,
        vec![(
            DEPRIVATION_SOURCE.to_string(),
            VariableSpec::lookup(Query::AddressAsOf {
                date: index_date.clone(),
                round_to_nearest: Some(100),
            }),
        )],
        generate_universal_expectations(10, false)?,
    )?;

    let regions = RatioTable::new([
        ("North East", 0.1),
        ("North West", 0.1),
        ("Yorkshire and The Humber", 0.1),
        ("East Midlands", 0.1),
        ("West Midlands", 0.1),
        ("East", 0.1),
        ("London", 0.2),
        ("South East", 0.1),
        ("South West", 0.1),
    ])?;
    builder.lookup(
        "cov_cat_region",
        Query::RegisteredPracticeAsOf {
            date: index_date.clone(),
        },
        Expectations::new().rate(Rate::Universal).category(regions),
    )?;

    let smoking_code = "most_recent_smoking_code";
    let ever_smoked = "ever_smoked";
    builder.categorised_as(
        "cov_cat_smoking_status",
        vec![
            CategoryRule::when("S", Condition::eq(smoking_code, "S")),
            CategoryRule::when(
                "E",
                Condition::or([
                    Condition::eq(smoking_code, "E"),
                    Condition::and([Condition::eq(smoking_code, "N"), Condition::flag(ever_smoked)]),
                ]),
            ),
            CategoryRule::when(
                "N",
                Condition::and([
                    Condition::eq(smoking_code, "N"),
                    Condition::not(Condition::flag(ever_smoked)),
                ]),
            ),
            CategoryRule::otherwise("M"),
        ],
        vec![
            (
                smoking_code.to_string(),
                VariableSpec::lookup(lookups.query(
                    Source::PrimaryCare,
                    "smoking_clear",
                    Period::new(history(), Returning::Category).last(),
                )?),
            ),
            (
                ever_smoked.to_string(),
                VariableSpec::lookup(Query::ClinicalEvents {
                    codelist: lookups.catalog.filter_by_category("smoking_clear", ["S", "E"])?.into(),
                    period: Period::new(history(), Returning::BinaryFlag),
                }),
            ),
        ],
        Expectations::new().category(RatioTable::new([
            ("S", 0.6),
            ("E", 0.1),
            ("N", 0.2),
            ("M", 0.1),
        ])?),
    )?;

    builder.lookup(
        "cov_bin_carehome_status",
        Query::CareHomeStatusAsOf {
            date: index_date.clone(),
            categories: care_home_categories()?,
        },
        Expectations::new()
            .rate(Rate::Universal)
            .category(RatioTable::new([("Yes", 0.3), ("No", 0.7)])?),
    )?;
    Ok(())
}

/// Care home categories over address attributes. The three `Yes` rules are
/// adjacent and merge into one.
fn care_home_categories() -> StudyResult<CategoryDictionary> {
    let care_home = || Condition::flag("IsPotentialCareHome");
    let nursing = |does_not_require: &str, requires: &str| {
        Condition::and([
            care_home(),
            Condition::eq("LocationDoesNotRequireNursing", does_not_require),
            Condition::eq("LocationRequiresNursing", requires),
        ])
    };
    CategoryDictionary::from_rules(vec![
        CategoryRule::when("Yes", nursing("Y", "N")),
        CategoryRule::when("Yes", nursing("N", "Y")),
        CategoryRule::when("Yes", care_home()),
        CategoryRule::otherwise("No"),
    ])
    .map_err(|e| StudyError::from_rule("cov_bin_carehome_status", e))
}

fn add_history(
    builder: &mut VariableSetBuilder,
    lookups: &Lookups<'_>,
    index_date: &DateBound,
) -> StudyResult<()> {
    let flag = |source: Source, codelist: &str| -> StudyResult<Query> {
        lookups.query(
            source,
            codelist,
            Period::new(DateWindow::on_or_before(index_date.clone()), Returning::BinaryFlag),
        )
    };

    for entry in HISTORY {
        match entry {
            History::Single {
                output,
                source,
                codelist,
            } => {
                builder.lookup(*output, flag(*source, *codelist)?, Expectations::new().incidence(0.01)?)?;
            }
            History::AnySource {
                output,
                inputs,
                combined,
            } => {
                for &(name, source, codelist) in *inputs {
                    builder.lookup(name, flag(source, codelist)?, Expectations::new().incidence(0.01)?)?;
                }
                builder.maximum_of(*output, *combined)?;
            }
        }
    }
    Ok(())
}

fn add_subgroups(builder: &mut VariableSetBuilder, lookups: &Lookups<'_>) -> StudyResult<()> {
    builder.lookup(
        "sub_date_covid19_hospital",
        Query::AdmittedToHospital {
            diagnoses: Some(lookups.codes("covid_codes")?),
            primary_diagnosis_only: true,
            period: Period::new(
                DateWindow::on_or_after(DateBound::variable("exp_date_covid19_confirmed")),
                Returning::DateAdmitted,
            )
            .first(),
        },
        since_index(0.05)?,
    )?;
    Ok(())
}
