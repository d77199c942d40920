// Table is the in-memory side of the system: rows of typed, named,
// formatted columns. Every query operation (filter, join, aggregate)
// is phrased as expression evaluation, with the table binding its own
// columns into the evaluation context.
//
// The TableView trait is the part of that surface a stored table can
// offer too; the column store implements it for its lazy proxies.

mod interchange;
mod join;
mod ops;
mod render;
mod table;
mod view;

#[cfg(test)]
mod test;

pub use interchange::CsvOptions;
pub use ops::sort_permutation;
pub use table::{default_format, ColumnData, Table};
pub use view::TableView;
