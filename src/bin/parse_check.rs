use lambda_sql::{ast::Expression, model::Catalog, parser::parse_lambda};

fn main() {
    println!("sizeof(Expression) = {}", std::mem::size_of::<Expression>());

    // no metadata: member types stay unknown, which is fine for a syntax check
    let catalog = Catalog::new();
    for line in std::io::stdin().lines() {
        let line = line.expect("a line");
        let now = std::time::Instant::now();
        let res = parse_lambda(&line, "Row", &catalog);
        print!("[in {}μs] ", now.elapsed().as_micros());
        match res {
            Err(e) => println!("Error parsing input: {e}"),
            Ok(tree) => println!("{tree}"),
        }
    }
}
