use criterion::{Criterion, criterion_group, criterion_main};
use lambda_sql::{
    Converter, QueryRequest,
    config::Config,
    model::{Catalog, Model, PropertyDescriptor},
    parser::parse_lambda,
};

const TESTS: [&str; 6] = [
    r#"p => p.Name == "Bob""#,
    r#"p => p.IsActive && p.Age >= 18"#,
    r#"p => new[] { 1, 2, 3, 5, 8, 13 }.Contains(p.Id)"#,
    r#"p => p.Manager.Name.StartsWith("A") || !p.Name.EndsWith("z")"#,
    r#"p => !(p.IsActive || p.Age < 18) && p.Manager.Manager.Id != 7"#,
    r#"p => ((((((((((p.Id + 1) * 2) - 3) % 4) + 5) * 6) - 7) % 8) + 9) * 10) > 0"#,
];

fn catalog() -> Catalog {
    Catalog::new().with(
        Model::new("Person")
            .table("people")
            .property(PropertyDescriptor::new("Id", "int"))
            .property(PropertyDescriptor::new("Name", "string").nullable())
            .property(PropertyDescriptor::new("Age", "int").nullable())
            .property(PropertyDescriptor::new("IsActive", "bool"))
            .property(
                PropertyDescriptor::new("Manager", "Person")
                    .nullable()
                    .column("manager_id")
                    .references("Person", "Id"),
            ),
    )
}

fn parse(catalog: &Catalog) {
    for test in TESTS.iter() {
        _ = std::hint::black_box(parse_lambda(test, "Person", catalog));
    }
}

fn parse_and_convert(catalog: &Catalog, converter: &Converter<'_, Catalog>) {
    for test in TESTS.iter() {
        let filter = parse_lambda(test, "Person", catalog).expect("valid lambda");
        let request = QueryRequest::new("Person").filter(filter);
        _ = std::hint::black_box(converter.convert(&request));
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let catalog = catalog();
    let converter = Converter::new(&catalog, &Config::default());
    c.bench_function("parse", |b| b.iter(|| parse(&catalog)));
    c.bench_function("parse and convert", |b| {
        b.iter(|| parse_and_convert(&catalog, &converter))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
