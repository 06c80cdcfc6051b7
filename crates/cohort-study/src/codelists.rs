//! Codelist declarations of the study.
//!
//! Paths are relative to the codelist directory. Lists exported from
//! OpenCodelists keep their published file names and columns; the remaining
//! lists are stored as `<name>.csv` with a `code` column (`dmd_id` for dm+d
//! medicine lists).
//!
//! # Examples
//!
//! ```
//! use cohort_study::codelists::{study_codelists, STUDY_CODELISTS};
//!
//! let sources = study_codelists();
//! assert_eq!(sources.len(), STUDY_CODELISTS.len());
//! assert!(sources.iter().any(|s| s.name == "smoking_clear"));
//! ```

use cohort_loader::CodelistSource;
use cohort_types::CodingSystem;

/// One codelist file of the study.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodelistDecl {
    /// Name the codelist is registered under.
    pub name: &'static str,
    /// File path relative to the codelist directory.
    pub path: &'static str,
    /// Coding system of the code column.
    pub system: CodingSystem,
    /// Column holding the codes.
    pub column: &'static str,
    /// Column holding categories, for categorised lists.
    pub category_column: Option<&'static str>,
}

impl CodelistDecl {
    const fn plain(
        name: &'static str,
        path: &'static str,
        system: CodingSystem,
        column: &'static str,
    ) -> Self {
        Self {
            name,
            path,
            system,
            column,
            category_column: None,
        }
    }

    const fn categorised(
        name: &'static str,
        path: &'static str,
        system: CodingSystem,
        column: &'static str,
        category_column: &'static str,
    ) -> Self {
        Self {
            name,
            path,
            system,
            column,
            category_column: Some(category_column),
        }
    }

    /// Converts to a loader source declaration.
    pub fn to_source(&self) -> CodelistSource {
        let source = CodelistSource::new(self.name, self.path, self.system, self.column);
        match self.category_column {
            Some(column) => source.with_category_column(column),
            None => source,
        }
    }
}

use CodingSystem::{Ctv3, Dmd, Icd10, Snomed};

/// Every codelist the study reads, in declaration order.
pub const STUDY_CODELISTS: &[CodelistDecl] = &[
    // =========================================================================
    // COVID-19
    // =========================================================================
    CodelistDecl::plain("covid_codes", "opensafely-covid-identification.csv", Icd10, "icd10_code"),
    CodelistDecl::plain(
        "covid_primary_care_positive_test",
        "opensafely-covid-identification-in-primary-care-probable-covid-positive-test.csv",
        Ctv3,
        "CTV3ID",
    ),
    CodelistDecl::plain(
        "covid_primary_care_code",
        "opensafely-covid-identification-in-primary-care-probable-covid-clinical-code.csv",
        Ctv3,
        "CTV3ID",
    ),
    CodelistDecl::plain(
        "covid_primary_care_sequalae",
        "opensafely-covid-identification-in-primary-care-probable-covid-sequelae.csv",
        Ctv3,
        "CTV3ID",
    ),
    CodelistDecl::plain("covid_vaccine_EMIS_codes", "primis-covid19-vacc-uptake-covadm1.csv", Snomed, "code"),
    CodelistDecl::plain("chronis_liver_disease_codes", "primis-covid19-vacc-uptake-cld.csv", Snomed, "code"),
    // =========================================================================
    // Demographics and lifestyle
    // =========================================================================
    CodelistDecl::categorised("opensafely_ethnicity_codes_16", "opensafely-ethnicity.csv", Ctv3, "Code", "Grouping_16"),
    CodelistDecl::categorised("opensafely_ethnicity_codes_6", "opensafely-ethnicity.csv", Ctv3, "Code", "Grouping_6"),
    CodelistDecl::categorised(
        "primis_covid19_vacc_update_ethnicity",
        "primis-covid19-vacc-uptake-eth2001.csv",
        Snomed,
        "code",
        "grouping_16_id",
    ),
    CodelistDecl::categorised("smoking_clear", "opensafely-smoking-clear.csv", Ctv3, "CTV3Code", "Category"),
    CodelistDecl::categorised("smoking_unclear", "opensafely-smoking-unclear.csv", Ctv3, "CTV3Code", "Category"),
    CodelistDecl::plain("dementia_codes", "opensafely-dementia-complete.csv", Ctv3, "code"),
    CodelistDecl::plain("bmi_codes", "primis-covid19-vacc-uptake-bmi.csv", Snomed, "code"),
    // =========================================================================
    // Quality assurance
    // =========================================================================
    CodelistDecl::plain("prostate_cancer_snomed_clinical", "prostate_cancer_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("prostate_cancer_icd10", "prostate_cancer_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("pregnancy_snomed_clinical", "pregnancy_snomed_clinical.csv", Snomed, "code"),
    // =========================================================================
    // Diabetes
    // =========================================================================
    CodelistDecl::plain("diabetes_type1_snomed", "diabetes_type1_snomed.csv", Snomed, "code"),
    CodelistDecl::plain("diabetes_type1_icd10", "diabetes_type1_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("diabetes_type2_snomed", "diabetes_type2_snomed.csv", Snomed, "code"),
    CodelistDecl::plain("diabetes_type2_icd10", "diabetes_type2_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("diabetes_other_snomed", "diabetes_other_snomed.csv", Snomed, "code"),
    CodelistDecl::plain("diabetes_gestational_snomed", "diabetes_gestational_snomed.csv", Snomed, "code"),
    CodelistDecl::plain("diabetes_diagnostic_snomed", "diabetes_diagnostic_snomed.csv", Snomed, "code"),
    CodelistDecl::plain("hba1c_codes", "hba1c_codes.csv", Snomed, "code"),
    CodelistDecl::plain("diabetes_drugs_dmd", "diabetes_drugs_dmd.csv", Dmd, "dmd_id"),
    // =========================================================================
    // Covariates
    // =========================================================================
    CodelistDecl::plain("ami_snomed_clinical", "ami_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("ami_prior_icd10", "ami_prior_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("ami_icd10", "ami_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("stroke_isch_snomed_clinical", "stroke_isch_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("stroke_sah_hs_snomed_clinical", "stroke_sah_hs_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("stroke_isch_icd10", "stroke_isch_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("stroke_sah_hs_icd10", "stroke_sah_hs_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("other_arterial_embolism_icd10", "other_arterial_embolism_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("all_vte_codes_snomed_clinical", "all_vte_codes_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("all_vte_codes_icd10", "all_vte_codes_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("hf_snomed_clinical", "hf_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("hf_icd10", "hf_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("angina_snomed_clinical", "angina_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("angina_icd10", "angina_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("dementia_snomed_clinical", "dementia_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("dementia_icd10", "dementia_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("dementia_vascular_snomed_clinical", "dementia_vascular_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("dementia_vascular_icd10", "dementia_vascular_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("liver_disease_snomed_clinical", "liver_disease_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("liver_disease_icd10", "liver_disease_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("ckd_snomed_clinical", "ckd_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("ckd_icd10", "ckd_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("cancer_snomed_clinical", "cancer_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("cancer_icd10", "cancer_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("hypertension_snomed_clinical", "hypertension_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("hypertension_icd10", "hypertension_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("hypertension_drugs_dmd", "hypertension_drugs_dmd.csv", Dmd, "dmd_id"),
    CodelistDecl::plain("bmi_obesity_snomed_clinical", "bmi_obesity_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("bmi_obesity_icd10", "bmi_obesity_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("depression_snomed_clinical", "depression_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("depression_icd10", "depression_icd10.csv", Icd10, "code"),
    CodelistDecl::plain("copd_snomed_clinical", "copd_snomed_clinical.csv", Snomed, "code"),
    CodelistDecl::plain("copd_icd10", "copd_icd10.csv", Icd10, "code"),
    // =========================================================================
    // Medications
    // =========================================================================
    CodelistDecl::plain("lipid_lowering_dmd", "lipid_lowering_dmd.csv", Dmd, "dmd_id"),
    CodelistDecl::plain("antiplatelet_dmd", "antiplatelet_dmd.csv", Dmd, "dmd_id"),
    CodelistDecl::plain("anticoagulant_dmd", "anticoagulant_dmd.csv", Dmd, "dmd_id"),
    CodelistDecl::plain("cocp_dmd", "cocp_dmd.csv", Dmd, "dmd_id"),
    CodelistDecl::plain("hrt_dmd", "hrt_dmd.csv", Dmd, "dmd_id"),
];

/// Source declarations for every study codelist.
pub fn study_codelists() -> Vec<CodelistSource> {
    STUDY_CODELISTS.iter().map(CodelistDecl::to_source).collect()
}

/// In-memory catalog holding two codes per study codelist.
#[cfg(test)]
pub(crate) fn fixture_catalog() -> cohort_loader::CodelistCatalog {
    use cohort_types::Codelist;

    let mut catalog = cohort_loader::CodelistCatalog::default();
    for decl in STUDY_CODELISTS {
        let codelist = match decl.category_column {
            Some(column) => {
                let mut codelist = Codelist::categorised(decl.name, decl.system, column);
                codelist.insert("X1", Some("S".to_string())).unwrap();
                codelist.insert("X2", Some("N".to_string())).unwrap();
                codelist
            }
            None => {
                let mut codelist = Codelist::new(decl.name, decl.system);
                codelist.insert("X1", None).unwrap();
                codelist.insert("X2", None).unwrap();
                codelist
            }
        };
        catalog.insert(codelist).unwrap();
    }
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let mut seen = HashSet::new();
        for decl in STUDY_CODELISTS {
            assert!(seen.insert(decl.name), "duplicate codelist {}", decl.name);
        }
    }

    #[test]
    fn test_to_source() {
        let smoking = STUDY_CODELISTS
            .iter()
            .find(|d| d.name == "smoking_clear")
            .unwrap()
            .to_source();
        assert_eq!(smoking.system, CodingSystem::Ctv3);
        assert_eq!(smoking.code_column, "CTV3Code");
        assert_eq!(smoking.category_column.as_deref(), Some("Category"));

        let covid = STUDY_CODELISTS[0].to_source();
        assert_eq!(covid.path.to_str(), Some("opensafely-covid-identification.csv"));
        assert!(covid.category_column.is_none());
    }

    #[test]
    fn test_medicine_lists_use_dmd() {
        for decl in STUDY_CODELISTS.iter().filter(|d| d.name.ends_with("_dmd")) {
            assert_eq!(decl.system, CodingSystem::Dmd, "{}", decl.name);
            assert_eq!(decl.column, "dmd_id");
        }
    }
}
