//! Command-line runner: execute a script file and print the value of its
//! last top-level expression.

use std::{cell::RefCell, process::ExitCode, rc::Rc};

use andante::{HostValue, Interpreter, LimitedTracker, StderrTracer, Value};

const USAGE: &str = "usage: andante [--max-steps N] [--trace] <script.js>";

struct Args {
    script: String,
    max_steps: Option<u64>,
    trace: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut script = None;
    let mut max_steps = None;
    let mut trace = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--max-steps" => {
                let value = args.next().ok_or("--max-steps requires a value")?;
                max_steps = Some(value.parse::<u64>().map_err(|_| "--max-steps requires an integer")?);
            }
            "--trace" => trace = true,
            "--help" | "-h" => return Err(USAGE.to_owned()),
            other if other.starts_with('-') => return Err(format!("unknown option: {other}\n{USAGE}")),
            other => {
                if script.replace(other.to_owned()).is_some() {
                    return Err(format!("multiple scripts given\n{USAGE}"));
                }
            }
        }
    }
    Ok(Args {
        script: script.ok_or(USAGE)?,
        max_steps,
        trace,
    })
}

fn render(interp: &Interpreter, value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_owned(),
        Value::Object(_) => match interp.pseudo_to_native(value) {
            Ok(host) => render_host(&host),
            Err(_) => "[object]".to_owned(),
        },
        Value::String(s) => format!("{s:?}"),
        other => match interp.pseudo_to_native(other) {
            Ok(host) => render_host(&host),
            Err(_) => "undefined".to_owned(),
        },
    }
}

fn render_host(value: &HostValue) -> String {
    match value {
        HostValue::Undefined => "undefined".to_owned(),
        HostValue::Null => "null".to_owned(),
        HostValue::Boolean(b) => b.to_string(),
        HostValue::Number(n) => n.to_string(),
        HostValue::String(s) => format!("{s:?}"),
        HostValue::Array(elements) => {
            let parts: Vec<String> = elements.iter().map(render_host).collect();
            format!("[{}]", parts.join(", "))
        }
        HostValue::Map(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(key, entry)| format!("{key}: {}", render_host(entry)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };
    let source = match std::fs::read_to_string(&args.script) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("andante: cannot read {}: {err}", args.script);
            return ExitCode::FAILURE;
        }
    };

    let built = match args.max_steps {
        Some(limit) => Interpreter::with_tracker(&source, LimitedTracker::max_steps(limit)),
        None => Interpreter::new(&source),
    };
    let mut interp = match built {
        Ok(interp) => interp,
        Err(err) => {
            eprintln!("andante: {err}");
            return ExitCode::FAILURE;
        }
    };
    if args.trace {
        interp.set_tracer(Rc::new(RefCell::new(StderrTracer)));
    }

    match interp.run() {
        Ok(false) => {
            let value = interp.value();
            println!("{}", render(&interp, &value));
            ExitCode::SUCCESS
        }
        Ok(true) => {
            eprintln!("andante: script paused on an async call with no host to resolve it");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("andante: uncaught {err}");
            ExitCode::FAILURE
        }
    }
}
