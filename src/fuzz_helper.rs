use crate::{
    Converter, Extractor, QueryRequest,
    config::{Config, DialectKind},
    model::{Catalog, Model, PropertyDescriptor},
    parser::parse_lambda,
};

fn catalog() -> Catalog {
    Catalog::new()
        .with(
            Model::new("Person")
                .table("people")
                .property(PropertyDescriptor::new("Id", "int"))
                .property(PropertyDescriptor::new("Name", "string").nullable())
                .property(PropertyDescriptor::new("Age", "int").nullable())
                .property(PropertyDescriptor::new("IsActive", "bool"))
                .property(PropertyDescriptor::new("Tags", "List<string>").hidden())
                .property(
                    PropertyDescriptor::new("Manager", "Person")
                        .nullable()
                        .column("manager_id")
                        .references("Person", "Id"),
                )
                .property(
                    PropertyDescriptor::new("Department", "Department")
                        .column("department_id")
                        .references("Department", "Id"),
                ),
        )
        .with(
            Model::new("Department")
                .table("departments")
                .property(PropertyDescriptor::new("Id", "int"))
                .property(PropertyDescriptor::new("Code", "string")),
        )
}

/// Parses `expr` as a `Person` filter, then converts it in every dialect and
///  extracts from it. Errors are expected and ignored; panics are not.
pub fn translate_expr(expr: &str) {
    let catalog = catalog();
    let Ok(filter) = parse_lambda(expr, "Person", &catalog) else {
        return;
    };

    for dialect in [DialectKind::Postgres, DialectKind::Sqlite] {
        let config = Config {
            dialect,
            ..Config::default()
        };
        let request = QueryRequest::new("Person").filter(filter.clone()).take(10);
        _ = Converter::new(&catalog, &config).convert(&request);
    }

    _ = Extractor::new(&catalog).extract(&filter, "Person", ["Id", "Name", "Code"]);
}
