//! Suffix-array construction tool over the external-memory pipeline.
//!
//! Builds the suffix array of a file, generated input or verbatim text with
//! a bounded memory budget, optionally verifying and exporting the result.

use clap::Parser;
use extmem::{
    stream::{materialize, Cut, Map, Stream},
    suffix::{sa_check, suffix_array},
    BlockManager, Config, ExtVec,
};
use std::{
    io::{BufReader, Read, Write},
    path::PathBuf,
    sync::Arc,
};

#[derive(Parser)]
#[command(
    name = "sufsort",
    about = "Difference-cover suffix array construction in external memory"
)]
struct Args {
    /// Path to input file (or verbatim text with -v). The special inputs
    /// "random" and "unary" generate such text on the fly.
    input: String,

    /// Check suffix array for correctness
    #[arg(short = 'c', long = "check")]
    check: bool,

    /// Print out suffix array in readable text
    #[arg(short = 't', long = "text")]
    text: bool,

    /// Output suffix array to given path
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Consider "input" as verbatim text to construct the suffix array on
    #[arg(short = 'v', long = "verbatim")]
    verbatim: bool,

    /// Cut input text to given size, e.g. 2G
    #[arg(short = 's', long = "size", value_parser = parse_bytes)]
    size: Option<u64>,

    /// Amount of RAM to use, default: 1G
    #[arg(short = 'M', long = "memuse", value_parser = parse_bytes)]
    memory: Option<u64>,

    /// Word size of the suffix array: 32, 40 or 64 bit
    #[arg(short = 'w', long = "wordsize", default_value_t = 32)]
    wordsize: u32,
}

fn parse_bytes(arg: &str) -> Result<u64, String> {
    let arg = arg.trim();
    let (digits, factor) = match arg.chars().last() {
        Some('k' | 'K') => (&arg[..arg.len() - 1], 1u64 << 10),
        Some('m' | 'M') => (&arg[..arg.len() - 1], 1 << 20),
        Some('g' | 'G') => (&arg[..arg.len() - 1], 1 << 30),
        _ => (arg, 1),
    };

    digits
        .parse::<u64>()
        .map(|n| n * factor)
        .map_err(|e| format!("invalid byte count {arg:?}: {e}"))
}

fn printable(c: u8) -> String {
    if c.is_ascii_alphanumeric() {
        format!("'{}'", c as char)
    } else {
        format!("{c}")
    }
}

/// Fills the input vector per the command line
fn load_input(
    args: &Args,
    manager: &Arc<BlockManager>,
) -> extmem::Result<Option<ExtVec<u8>>> {
    let mut vec = ExtVec::<u8>::new(Arc::clone(manager));

    if args.verbatim {
        let bytes = args.input.as_bytes();
        vec.resize(bytes.len(), false)?;
        let mut writer = vec.write_range(0, bytes.len())?;
        for b in bytes {
            writer.write(*b)?;
        }
        writer.finish()?;
    } else if args.input == "random" {
        let Some(size) = args.size else {
            eprintln!("You must provide -s <size> for generated inputs.");
            return Ok(None);
        };

        use rand::Rng;
        let mut rng = rand::thread_rng();
        vec.resize(size as usize, false)?;
        extmem::generate(&mut vec, || rng.gen::<u8>())?;
    } else if args.input == "unary" {
        let Some(size) = args.size else {
            eprintln!("You must provide -s <size> for generated inputs.");
            return Ok(None);
        };

        vec.resize(size as usize, false)?;
        extmem::generate(&mut vec, || b'a')?;
    } else {
        let file = std::fs::File::open(&args.input)?;
        let len = file.metadata()?.len();
        let take = args.size.map_or(len, |s| s.min(len)) as usize;

        vec.resize(take, false)?;
        let mut writer = vec.write_range(0, take)?;
        let mut reader = BufReader::new(file);

        let mut chunk = vec![0u8; 1 << 20];
        let mut copied = 0usize;
        while copied < take {
            let n = reader.read(&mut chunk)?.min(take - copied);
            if n == 0 {
                break;
            }
            for b in &chunk[..n] {
                writer.write(*b)?;
            }
            copied += n;
        }
        writer.finish()?;
    }

    Ok(Some(vec))
}

fn run(args: &Args) -> extmem::Result<i32> {
    let memory = args.memory.unwrap_or(1 << 30) as usize;

    let manager = Config::from_env()?.open()?;

    let Some(mut input_vector) = load_input(args, &manager)? else {
        return Ok(-1);
    };

    let mut size = input_vector.len();
    if let Some(limit) = args.size {
        size = size.min(limit as usize);
    }

    println!("input size = {size}");

    let max_offset: u128 = match args.wordsize {
        32 => 1 << 32,
        40 => 1 << 40,
        64 => 1 << 64,
        _ => {
            eprintln!("Invalid wordsize for suffix array: 32, 40 or 64 are allowed.");
            return Ok(-1);
        }
    };
    if u128::from(size as u64) + 3 >= max_offset {
        eprintln!("error: input is too long for selected word size!");
        return Ok(-1);
    }

    // construct the suffix array through the pipeline
    let mut output_vector = ExtVec::<u64>::new(Arc::clone(&manager));
    output_vector.resize(size, false)?;

    {
        let chars = Cut::new(
            Map::new(input_vector.stream()?, |c: &u8| u64::from(*c)),
            size,
        );
        let sa = suffix_array(chars, memory, &manager)?;
        materialize(sa, output_vector.write_range(0, size)?)?;
    }

    println!("output size = {}", output_vector.len());

    if let Some(path) = &args.output {
        write_output(path, &mut output_vector, args.wordsize)?;
    }

    if args.text {
        println!();
        println!("resulting suffix array:");

        for i in 0..output_vector.len() {
            let pos = *output_vector.get(i)? as usize;
            print!("{i} : {pos} : ");

            let mut suffix = String::new();
            for j in pos..size {
                suffix.push_str(&printable(*input_vector.get(j)?));
                suffix.push(' ');
            }
            println!("{suffix}");
        }
    }

    if args.check {
        print!("checking suffix array... ");
        std::io::stdout().flush()?;

        let text = Map::new(input_vector.stream()?, |c: &u8| u64::from(*c));
        let text = Cut::new(text, size);
        let sa = output_vector.stream()?;

        if sa_check(text, sa, memory, &manager)? {
            println!("ok.");
        } else {
            println!("failed!");
            return Ok(-1);
        }
    }

    Ok(0)
}

fn write_output(path: &std::path::Path, sa: &mut ExtVec<u64>, wordsize: u32) -> extmem::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    let width = (wordsize / 8) as usize;
    let mut stream = sa.stream()?;
    while !stream.is_empty() {
        let bytes = stream.peek().to_le_bytes();
        writer.write_all(&bytes[..width])?;
        stream.advance()?;
    }

    writer.flush()?;
    Ok(())
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("sufsort: {e}");
            std::process::exit(1);
        }
    }
}
