use dbrowser_core::{CellValue, Row, Table};

pub fn int_cell(value: i64) -> CellValue {
    CellValue::Int(value)
}

pub fn text_cell(value: impl Into<String>) -> CellValue {
    CellValue::Text(value.into())
}

/// Age assigned to user `id`; repeats so that age sorts need the tie-breaker.
pub fn user_age(id: i64) -> i64 {
    20 + (id * 7) % 13
}

/// `users(id, name, age)` with ids `1..=count`.
pub fn users_table(count: i64) -> Table {
    let mut rows = vec![Row::header(["id", "name", "age"])];
    rows.extend((1..=count).map(|id| {
        Row::data(
            int_cell(id),
            vec![
                int_cell(id),
                text_cell(format!("user{:02}", id)),
                int_cell(user_age(id)),
            ],
        )
    }));
    Table::new("users", rows)
}

/// A table with a header row and no data.
pub fn empty_table(name: impl Into<String>, columns: &[&str]) -> Table {
    Table::new(name, vec![Row::header(columns.iter().copied())])
}
