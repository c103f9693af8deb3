use std::env;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Expected arguments count is 2, got {}", args.len());
        std::process::exit(1);
    }

    let source = &args[1];
    match cc7::compile(source) {
        Ok(assembly) => print!("{assembly}"),
        Err(error) => error.report(source),
    }
}
