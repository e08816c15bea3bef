use clap::Parser;
use std::env;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use arabica::classfile::{parse_class_bytes, Attribute};
use arabica::classpath::{java_home, ClassPathEntry};
use arabica::interpreter::run_method;
use arabica::runtime::Thread;

#[derive(Parser, Debug)]
#[command(name = "arabica")]
#[command(about = "An early-stage Java virtual machine", version)]
struct Args {
    /// Class search path of directories and archive files
    #[arg(long, visible_alias = "cp", value_name = "PATH")]
    classpath: Option<String>,

    /// Entry class, e.g. com/example/Main
    #[arg(value_name = "CLASS")]
    class: String,

    /// Arguments passed to the program
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Folds the launcher's single-dash option spellings (-help, -version,
/// -classpath PATH, -cp PATH) into the double-dash forms the parser
/// understands; the double-dash spellings keep working as well. Option
/// folding stops at `--` or the first positional, so anything after the
/// entry class reaches the program untouched.
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut args = args.into_iter();
    let mut normalized = Vec::new();
    // argv[0] is the binary name, never an option.
    normalized.extend(args.next());
    let mut options_over = false;
    // The token after a space-separated -classpath/-cp is its value, not
    // the end of the options.
    let mut expect_value = false;
    for arg in args {
        if options_over || expect_value {
            expect_value = false;
            normalized.push(arg);
        } else if arg == "-help" {
            normalized.push("--help".to_string());
        } else if arg == "-version" {
            normalized.push("--version".to_string());
        } else if arg == "-classpath" || arg == "-cp" {
            expect_value = true;
            normalized.push(format!("-{arg}"));
        } else if arg == "--classpath" || arg == "--cp" {
            expect_value = true;
            normalized.push(arg);
        } else if arg.starts_with("-classpath=") || arg.starts_with("-cp=") {
            normalized.push(format!("-{arg}"));
        } else {
            if arg == "--" || !arg.starts_with('-') {
                options_over = true;
            }
            normalized.push(arg);
        }
    }
    normalized
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse_from(normalize_args(env::args()));
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let classpath = match &args.classpath {
        Some(classpath) => classpath.clone(),
        None => java_home()
            .map(|home| home.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string()),
    };
    let entry = ClassPathEntry::new(&classpath)?;

    // Accept both com.example.Main and com/example/Main spellings.
    let qualified_name = args.class.replace('.', "/");
    let bytes = entry.read_class(&qualified_name)?;
    let class = parse_class_bytes(&bytes)?;
    info!(
        class = class.class_name().unwrap_or(&qualified_name),
        major = class.major_version,
        "loaded class"
    );

    let main = class
        .find_method("main")
        .ok_or_else(|| format!("class {qualified_name} has no main method"))?;
    let Some(Attribute::Code {
        max_stack,
        max_locals,
        code,
        ..
    }) = main.code_attribute()
    else {
        return Err(format!("main method of {qualified_name} has no Code attribute").into());
    };
    if !args.args.is_empty() {
        info!(count = args.args.len(), "program arguments are not wired up yet");
    }

    let mut thread = Thread::new();
    run_method(&mut thread, *max_locals, *max_stack, code)?;
    Ok(())
}
