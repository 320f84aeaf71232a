use std::io::{self, Write};

use silt_engine::Value;

fn main() {
    run_repl()
}

fn run_repl() {
    let mut buf = String::new();
    let stdin = io::stdin();
    let mut count = 0;

    // Console machine with the prelude loaded.
    let mut vm = silt_engine::new_vm().expect("failed creating the core environment");

    loop {
        count += 1;
        buf.clear();
        print!("{count} > ");
        let _ = io::stdout().flush();
        if stdin.read_line(&mut buf).expect("read stdin") == 0 {
            return;
        }
        if buf.trim().is_empty() {
            continue;
        }

        match vm.eval_str(buf.as_str()) {
            Ok(Value::Nil) => {
                // don't echo the empty list, it's the "nothing" value
            }
            Ok(value) => {
                println!("{}", value.repr());
            }
            Err(err) => {
                eprintln!("error: {err}");
            }
        }
    }
}
