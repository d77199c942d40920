mod composite;
mod format;
mod schema;
