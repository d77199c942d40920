// The data model shared by every other crate: what a cell can hold, what
// type a column has, how it is displayed, and the column schema itself.
//
// Values are deliberately one flat enum. Composite values (time series,
// peak maps) sit behind `Lazy` so a store can hand out a cheap reference
// and defer loading the payload until someone actually looks at it.

mod composite;
mod format;
mod schema;
mod types;
mod value;

#[cfg(test)]
mod test;

pub use composite::{Lazy, Materialize, Payload, PayloadCodec, PeakMap, Polarity, Spectrum, TimeSeries};
pub use format::Format;
pub use schema::{split_postfix, Row, Schema, TableId};
pub use types::TypeTag;
pub use value::{Value, ValueKey};
