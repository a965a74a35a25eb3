use argh::FromArgs;
use mpc::{
    circuits::and_gates_for_sort,
    gmw::{share_random_triple, PrecomputedBitData},
    Party,
};
use rand::{prelude::StdRng, Rng, SeedableRng};

#[derive(FromArgs)]
/// Offline preprocessing tool for the secure median protocol.
struct Options {
    /// output path pattern ('#' is replaced with party ID)
    #[argh(option)]
    output: String,

    /// number of variants in the aligned study files
    #[argh(option)]
    rows: usize,

    /// bit width of encoded standard errors
    #[argh(option, default = "32")]
    bit_width: usize,

    /// number of AND triples to generate (default: exactly as many as the median needs)
    #[argh(option)]
    and_triples: Option<usize>,

    /// seed of the random generator (default: fresh entropy)
    #[argh(option)]
    seed: Option<u64>,
}

/// Generate AND triples for both parties.
fn generate(mut rng: impl Rng, count: usize) -> [PrecomputedBitData; 2] {
    let mut data = [Party::First, Party::Second].map(|party| PrecomputedBitData {
        party,
        and_triples: Vec::with_capacity(count),
    });
    for _ in 0..count {
        for (party_data, triple) in data.iter_mut().zip(share_random_triple(&mut rng)) {
            party_data.and_triples.push(triple);
        }
    }
    data
}

fn main() {
    let options: Options = argh::from_env();
    let count = options
        .and_triples
        .unwrap_or_else(|| and_gates_for_sort(options.rows, options.bit_width));

    let rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    println!("Generating {count} AND triples...");
    let data = generate(rng, count);

    println!("Saving...");
    for party_data in data {
        let output_path = options
            .output
            .replace('#', &format!("{}", party_data.party.id()));
        if let Err(err) = party_data.save_file(&output_path) {
            eprintln!("Cannot save '{output_path}': {err}");
            std::process::exit(1);
        }
    }
}
