use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

// ============================================================
// Lenient numeric decoding
// ============================================================

/// Counts and sums may arrive as integers, integral floats or numeric strings
/// depending on the gateway; a `null` SUM over no rows counts as zero.
pub fn count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match JsonValue::deserialize(deserializer)? {
        JsonValue::Null => Ok(0),
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| D::Error::custom(format!("{} is not a whole number", n))),
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .or_else(|_| {
                s.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
                    .ok_or(())
            })
            .map_err(|_| D::Error::custom(format!("'{}' is not a whole number", s))),
        other => Err(D::Error::custom(format!("expected a count, got {}", other))),
    }
}

/// Averages come back as `numeric`, which some gateways render as strings.
pub fn decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match JsonValue::deserialize(deserializer)? {
        JsonValue::Null => Ok(None),
        JsonValue::Number(n) => Ok(n.as_f64()),
        JsonValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("'{}' is not a number", s))),
        other => Err(D::Error::custom(format!("expected a number, got {}", other))),
    }
}

// ============================================================
// Request types
// ============================================================

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub user_query: String,
    #[serde(alias = "output_type")]
    pub format: String,
}

// ============================================================
// Response types
// ============================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PatientCountResponse {
    #[serde(deserialize_with = "count")]
    pub number_of_patients: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct IntakesResponse {
    #[serde(deserialize_with = "count")]
    pub total_intakes: i64,
    #[serde(default, deserialize_with = "count")]
    pub intakes_within_72_hours: i64,
    #[serde(default, deserialize_with = "count")]
    pub intakes_within_30_days: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DischargesResponse {
    #[serde(deserialize_with = "count")]
    pub total_discharges: i64,
    #[serde(default, deserialize_with = "count")]
    pub discharges_hospital: i64,
    #[serde(default, deserialize_with = "count")]
    pub discharges_higher_level: i64,
    #[serde(default, deserialize_with = "count")]
    pub discharges_home_community: i64,
    #[serde(default, deserialize_with = "count")]
    pub discharges_undesirable_circumstances: i64,
    #[serde(default, deserialize_with = "count")]
    pub discharges_unknown: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AverageLengthOfStayResponse {
    #[serde(deserialize_with = "decimal")]
    pub average_length_of_stay: Option<f64>,
}

/// Discharge outcome counts shared by every demographic breakdown.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DischargeCounts {
    #[serde(deserialize_with = "count")]
    pub discharge_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub total_higher_level: i64,
    #[serde(default, deserialize_with = "count")]
    pub total_home_community: i64,
    #[serde(default, deserialize_with = "count")]
    pub total_hospital: i64,
    #[serde(default, deserialize_with = "count")]
    pub total_undesirable_circumstances: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct GenderDischarge {
    pub gender: String,
    #[serde(flatten)]
    pub counts: DischargeCounts,
    #[serde(deserialize_with = "count")]
    pub total: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TransgenderDischarge {
    pub transgender_identity: String,
    #[serde(flatten)]
    pub counts: DischargeCounts,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SexualOrientationDischarge {
    pub sexual_orientation: String,
    #[serde(flatten)]
    pub counts: DischargeCounts,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RaceEthnicityDischarge {
    pub race_or_ethnicity: String,
    #[serde(flatten)]
    pub counts: DischargeCounts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_accepts_gateway_shapes() {
        let resp: IntakesResponse = serde_json::from_value(json!({
            "total_intakes": "42",
            "intakes_within_72_hours": 3.0,
            "intakes_within_30_days": null
        }))
        .unwrap();
        assert_eq!(
            resp,
            IntakesResponse {
                total_intakes: 42,
                intakes_within_72_hours: 3,
                intakes_within_30_days: 0,
            }
        );
    }

    #[test]
    fn test_count_rejects_fractions() {
        let result: Result<PatientCountResponse, _> =
            serde_json::from_value(json!({"number_of_patients": 2.5}));
        assert!(result.is_err());
    }

    #[test]
    fn test_average_accepts_numeric_string() {
        let resp: AverageLengthOfStayResponse =
            serde_json::from_value(json!({"average_length_of_stay": "12.75"})).unwrap();
        assert_eq!(resp.average_length_of_stay, Some(12.75));
    }

    #[test]
    fn test_breakdown_flattens_counts() {
        let row = json!({
            "gender": "female",
            "discharge_count": 4,
            "total_higher_level": 1,
            "total_home_community": 2,
            "total_hospital": 1,
            "total_undesirable_circumstances": 0,
            "total": 4
        });
        let parsed: GenderDischarge = serde_json::from_value(row.clone()).unwrap();
        assert_eq!(parsed.counts.total_home_community, 2);
        assert_eq!(serde_json::to_value(&parsed).unwrap(), row);
    }
}
