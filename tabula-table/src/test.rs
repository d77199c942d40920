use tabula_lang::{TypeTag, Value};
use crate::Table;

mod interchange;
mod table;

// a: Int, b: Float; rows (1, 1.0), (None, 2.0), (3, None).
pub(crate) fn sample() -> Table {
    Table::from_rows(
        &["a", "b"],
        &[TypeTag::Int, TypeTag::Float],
        &[Some("%d"), Some("%.1f")],
        vec![
            vec![Value::Int(1), Value::Float(1.0)],
            vec![Value::Null, Value::Float(2.0)],
            vec![Value::Int(3), Value::Null],
        ],
    )
    .unwrap()
}

pub(crate) fn col(t: &Table, name: &str) -> Vec<Value> {
    use crate::TableView;
    t.column_values(name).unwrap().as_ref().clone()
}
