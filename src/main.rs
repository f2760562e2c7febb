use clap::{Arg, ArgAction, Command};
use color_eyre::eyre::Result;

use rangelex::pipeline::{generate, CancelToken, GenOptions};
use rangelex::reg_ex::{parse_microsyntax_list, read_microsyntax_file};
use rangelex::report::{DotSink, NullSink, StageSink};
use rangelex::scanner::construct_scanner;
use rangelex::visualizer::visualize;

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Command::new("rangelex").version("0.1.0")
        .about("A lexer generator: compiles regular expression rules into a minimal range-labeled DFA")
        .after_help("Negated character classes and . are interpreted against printable ASCII plus tab.")
        .arg(Arg::new("microsyntax").short('f').long("file").value_name("FILE")
            .help("Microsyntax file with one REGEX::CATEGORY rule per line").required(true))
        .arg(Arg::new("structured").short('s').long("structured")
            .help("Minimize every rule separately before combining them")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("emit-steps").short('e').long("emit-steps")
            .help("Emit an artefact after every construction step")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("combine-graphs").short('c').long("combine-graphs")
            .help("Aggregate all emitted graphs into a single DOT artefact")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("preserve-labels").short('p').long("preserve-labels")
            .help("Keep per-rule state labels across merges")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("dot-dir").short('d').long("dot-dir").value_name("DIR")
            .help("Directory to write DOT artefacts into"))
        .arg(Arg::new("render").short('r').long("render")
            .help("Also render every DOT artefact to jpg with Graphviz")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("table").short('t').long("table").value_name("FILE")
            .help("Write the minimal DFA table as JSON"))
        .arg(Arg::new("scan").long("scan").value_name("FILE")
            .help("Tokenize the given source file with the generated scanner"))
        .arg(Arg::new("skip").long("skip").value_name("CATEGORY")
            .help("Categories to drop while scanning")
            .action(ArgAction::Append))
        .arg(Arg::new("visualize").short('v').long("visualize")
            .help("Open the interactive automaton visualizer")
            .action(ArgAction::SetTrue))
        .get_matches();

    let microsyntax_file = args.get_one::<String>("microsyntax").unwrap();

    let entries = read_microsyntax_file(microsyntax_file)?;
    let description = parse_microsyntax_list(entries)?;

    let options = GenOptions {
        emit_steps: args.get_flag("emit-steps"),
        propagate_labels: args.get_flag("preserve-labels"),
        combine_graphs: args.get_flag("combine-graphs"),
        structured: args.get_flag("structured"),
    };

    let mut sink: Box<dyn StageSink> = match args.get_one::<String>("dot-dir") {
        Some(directory) => Box::new(DotSink::new(
            directory,
            options.combine_graphs,
            args.get_flag("render"),
        )),
        None => Box::new(NullSink),
    };

    let cancel = CancelToken::new();
    let generated = generate(&description, &options, sink.as_mut(), &cancel)?;

    for skipped in &generated.skipped {
        eprintln!("Skipped rule {}: {}", skipped.name, skipped.reason);
    }

    println!(
        "Minimal DFA has {} states over the alphabet {}",
        generated.minimal_dfa.get_num_states(),
        generated.minimal_dfa.get_alphabet()
    );

    if let Some(table_path) = args.get_one::<String>("table") {
        generated.table.save(table_path)?;
        println!("Minimal DFA table saved as {}", table_path);
    }

    if let Some(source_file) = args.get_one::<String>("scan") {
        let scanner = construct_scanner(&generated.minimal_dfa, generated.table.rules.clone());
        let skip_list: Vec<String> = args
            .get_many::<String>("skip")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        let skip = if skip_list.is_empty() {
            None
        } else {
            Some(skip_list.as_slice())
        };
        let token_list = scanner.scan_file(source_file, skip)?;
        for token in token_list {
            println!(
                "The token is {} and the category is {}",
                token.get_token(),
                token.get_category()
            );
        }
    }

    if args.get_flag("visualize") {
        visualize(&generated.minimal_dfa, &generated.table.rules);
    }

    Ok(())
}
