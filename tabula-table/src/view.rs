use std::sync::Arc;
use tabula_base::Result;
use tabula_eval::Expr;
use tabula_lang::{Format, Row, Schema, TableId, TypeTag, Value};
use crate::Table;

// The read side shared by in-memory tables and lazy views over stored
// ones. Anything that only looks at a table should take a TableView.
pub trait TableView {
    fn id(&self) -> TableId;
    fn schema(&self) -> &Schema;
    fn len(&self) -> usize;
    fn title(&self) -> Option<&str>;
    fn row(&self, i: usize) -> Result<Row>;
    fn column_values(&self, name: &str) -> Result<Arc<Vec<Value>>>;

    // Rows for which `pred` is true; false and None both drop the row.
    fn filter(&self, pred: &Expr) -> Result<Table>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn columns(&self) -> Vec<(String, TypeTag, Option<Format>)> {
        let s = self.schema();
        (0..s.len())
            .map(|i| (s.name(i).to_string(), s.type_at(i), s.format_at(i).cloned()))
            .collect()
    }

    // The expression leaf for a column, for building predicates.
    fn column(&self, name: &str) -> Result<Expr> {
        self.schema().require(name)?;
        Ok(Expr::column(self.id(), name))
    }
}
