use super::ChatMessage;
use crate::db::Row;

const SQL_SYSTEM_PROMPT: &str = "You are an SQL expert.";

const PATIENT_SCHEMA: &str = "Table 1 - patient: Columns (patient_id: int4, name: varchar, \
age: int4, length_of_stay: int4, gender: text, transgender_identity: text, \
sexual_orientation: text, race_or_ethnicity: text, diagnosis: text, patient_notes: text, \
dialogue: text, treatment: text)";

/// Messages asking the model to translate a question into SQL.
pub fn sql_generation(user_query: &str) -> Vec<ChatMessage> {
    let prompt = format!(
        "Convert the following natural language query into an SQL string:\n\
         Query: \"{}\"\n\
         Database structure:\n\n\
         {}\n\n\
         SQL Query string:",
        user_query, PATIENT_SCHEMA
    );
    vec![
        ChatMessage::system(SQL_SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ]
}

/// Messages asking the model to summarize query results.
pub fn summary(rows: &[Row], sql: &str, user_query: &str) -> Vec<ChatMessage> {
    let data = serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string());
    let prompt = format!(
        "Given the following data returned from the following sql query and following \
         user query, give a short summary of the data:\n\
         Data: \"{}\"\n\
         SQL_query: \"{}\"\n\
         User_query: \"{}\"\n\n\
         Text Summarization:",
        data, sql, user_query
    );
    vec![ChatMessage::user(prompt)]
}

/// Pull the SQL statement out of a completion, dropping any Markdown fence.
pub fn extract_sql(completion: &str) -> String {
    let trimmed = completion.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Skip the info string ("sql", "postgresql", ...) on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}
