use rand::{Rng, RngCore};

use empload_core::Department;

/// Department codes and names seeded before the first batch.
pub const DEPARTMENT_CATALOG: &[(&str, &str)] = &[
    ("d001", "Marketing"),
    ("d002", "Finance"),
    ("d003", "Human Resources"),
    ("d004", "Research and Development"),
    ("d005", "Quality Assurance"),
    ("d006", "Sales"),
    ("d007", "IT"),
    ("d008", "Operations"),
    ("d009", "Customer Support"),
    ("d010", "Product Management"),
];

const HIGH_BUDGET_DEPARTMENTS: &[&str] = &["IT", "Sales", "Research and Development"];

/// Catalogue departments with budgets drawn per tier.
pub fn default_departments(rng: &mut dyn RngCore) -> Vec<Department> {
    DEPARTMENT_CATALOG
        .iter()
        .map(|(code, name)| {
            let budget = if HIGH_BUDGET_DEPARTMENTS.contains(name) {
                rng.random_range(1_500_000..=2_000_000)
            } else {
                rng.random_range(800_000..=1_200_000)
            };
            Department {
                code: (*code).to_string(),
                name: (*name).to_string(),
                budget,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn catalogue_codes_are_unique_and_budgets_tiered() {
        let departments = default_departments(&mut ChaCha8Rng::seed_from_u64(2));
        let codes: BTreeSet<_> = departments.iter().map(|dept| dept.code.as_str()).collect();
        assert_eq!(codes.len(), DEPARTMENT_CATALOG.len());

        for dept in &departments {
            if HIGH_BUDGET_DEPARTMENTS.contains(&dept.name.as_str()) {
                assert!((1_500_000..=2_000_000).contains(&dept.budget), "{dept:?}");
            } else {
                assert!((800_000..=1_200_000).contains(&dept.budget), "{dept:?}");
            }
        }
    }
}
