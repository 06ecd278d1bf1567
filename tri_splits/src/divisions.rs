// Division/gender aggregation for the averages chart: professional divisions
// sort first, then age groups ascending by age, with unrecognized strings last.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Gender, ResultRow};

/// Sort key for a division string. Derived `Ord` walks the fields in
/// declaration order: tier, then age, then gender letter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DivisionKey {
    pub tier: u8,
    pub age: u32,
    pub gender: char,
}

/// Tier 0: literal MPRO/FPRO. Tier 1: age group like "M35-39".
/// Tier 2: anything else, sorted last.
pub fn division_sort_key(division: &str) -> DivisionKey {
    let d = division.trim().to_ascii_uppercase();
    match d.as_str() {
        "MPRO" => {
            return DivisionKey {
                tier: 0,
                age: 0,
                gender: 'M',
            }
        }
        "FPRO" => {
            return DivisionKey {
                tier: 0,
                age: 0,
                gender: 'F',
            }
        }
        _ => {}
    }

    let bytes = d.as_bytes();
    if matches!(bytes.first(), Some(b'M') | Some(b'F')) {
        let digits: &[u8] = &bytes[1..];
        let digit_count = digits.iter().take_while(|b| b.is_ascii_digit()).count();
        if digit_count > 0 && digits.get(digit_count) == Some(&b'-') {
            let age = d[1..1 + digit_count].parse::<u32>().unwrap_or(999);
            return DivisionKey {
                tier: 1,
                age,
                gender: bytes[0] as char,
            };
        }
    }

    DivisionKey {
        tier: 2,
        age: 999,
        gender: 'Z',
    }
}

/// Mean Overall seconds for one (division, gender) group.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DivisionAverage {
    pub division: String,
    pub gender: Gender,
    pub mean_overall_secs: f64,
}

impl DivisionAverage {
    /// Bar label combining the division string with the gender word.
    pub fn label(&self) -> String {
        format!("{} ({})", self.division, self.gender.label())
    }

    pub fn formatted_mean(&self) -> String {
        crate::format_hms(self.mean_overall_secs)
    }
}

/// Group rows by exact division string and normalized gender, averaging the
/// Overall time. Rows without a parseable Overall or a recognized gender are
/// excluded here, not globally dropped. Output is sorted by division key,
/// ties broken by gender letter.
pub fn division_averages(rows: &[ResultRow]) -> Vec<DivisionAverage> {
    let mut groups: BTreeMap<(String, Gender), (f64, usize)> = BTreeMap::new();
    for row in rows {
        let (secs, gender) = match (row.overall_secs, row.gender_code) {
            (Some(secs), Some(gender)) => (secs, gender),
            _ => continue,
        };
        let entry = groups
            .entry((row.division.clone(), gender))
            .or_insert((0.0, 0));
        entry.0 += secs;
        entry.1 += 1;
    }

    let mut averages: Vec<DivisionAverage> = groups
        .into_iter()
        .map(|((division, gender), (sum, count))| DivisionAverage {
            division,
            gender,
            mean_overall_secs: sum / count as f64,
        })
        .collect();

    averages.sort_by(|a, b| {
        division_sort_key(&a.division)
            .cmp(&division_sort_key(&b.division))
            .then(a.gender.cmp(&b.gender))
    });
    averages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Dataset;

    #[test]
    fn pro_sorts_before_age_groups_before_unknown() {
        let mpro = division_sort_key("MPRO");
        let m35 = division_sort_key("M35-39");
        let m40 = division_sort_key("M40-44");
        let unknown = division_sort_key("UNKNOWN");
        assert!(mpro < m35);
        assert!(m35 < m40);
        assert!(m40 < unknown);
    }

    #[test]
    fn female_pro_sorts_before_male_pro() {
        assert!(division_sort_key("FPRO") < division_sort_key("MPRO"));
    }

    #[test]
    fn age_group_key_captures_age_and_gender() {
        let key = division_sort_key(" f30-34 ");
        assert_eq!(
            key,
            DivisionKey {
                tier: 1,
                age: 30,
                gender: 'F'
            }
        );
    }

    #[test]
    fn malformed_age_groups_fall_to_last_tier() {
        assert_eq!(division_sort_key("M-39").tier, 2);
        assert_eq!(division_sort_key("X35-39").tier, 2);
        assert_eq!(division_sort_key("M35").tier, 2);
        assert_eq!(division_sort_key("").tier, 2);
    }

    #[test]
    fn averages_filter_and_group() {
        let csv = "Name,Gender,Division,Swim,Bike,Run,Overall\n\
                   A,Male,M35-39,1:00:00,5:00:00,3:00:00,9:00:00\n\
                   B,Male,M35-39,1:00:00,5:00:00,3:00:00,11:00:00\n\
                   C,Female,F35-39,1:00:00,5:00:00,3:00:00,10:00:00\n\
                   D,Other,M35-39,1:00:00,5:00:00,3:00:00,9:00:00\n\
                   E,Male,M35-39,1:00:00,5:00:00,3:00:00,\n";
        let dataset = Dataset::from_bytes(csv.as_bytes()).unwrap();
        let averages = division_averages(dataset.rows());

        // D (unrecognized gender) and E (no Overall) are excluded.
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].division, "F35-39");
        assert_eq!(averages[0].gender, Gender::F);
        assert_eq!(averages[0].mean_overall_secs, 10.0 * 3600.0);
        assert_eq!(averages[1].division, "M35-39");
        assert_eq!(averages[1].mean_overall_secs, 10.0 * 3600.0);
    }

    #[test]
    fn averages_keep_unrecognized_divisions_last() {
        let csv = "Name,Gender,Division,Swim,Bike,Run,Overall\n\
                   A,Male,OPEN,1:00:00,5:00:00,3:00:00,9:00:00\n\
                   B,Male,MPRO,1:00:00,5:00:00,3:00:00,8:00:00\n";
        let dataset = Dataset::from_bytes(csv.as_bytes()).unwrap();
        let averages = division_averages(dataset.rows());
        assert_eq!(averages[0].division, "MPRO");
        assert_eq!(averages[1].division, "OPEN");
    }
}
