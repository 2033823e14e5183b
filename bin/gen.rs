use clap::{Arg, Command};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Writes a synthetic upload file and its metadata sidecar")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(Arg::new("campaign").long("campaign").default_value("camp1"))
        .arg(Arg::new("template").long("template").default_value("tmpl1"))
        .arg(
            Arg::new("params")
                .long("params")
                .value_parser(clap::value_parser!(usize))
                .default_value("2"),
        )
        .arg(
            Arg::new("dir")
                .long("dir")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value("./upload"),
        )
        .get_matches();

    let rows: u64 = *matches.get_one("rows").unwrap();
    let params: usize = *matches.get_one("params").unwrap();
    let campaign = matches.get_one::<String>("campaign").unwrap();
    let template = matches.get_one::<String>("template").unwrap();
    let dir = matches.get_one::<PathBuf>("dir").unwrap();
    std::fs::create_dir_all(dir)?;

    let mut columns = vec!["id".to_string(), "recipient".to_string()];
    columns.extend(std::iter::repeat("parameter".to_string()).take(params));
    let metadata = serde_json::json!({ "mediaType": "none", "columns": columns });
    std::fs::write(
        dir.join(format!("{campaign}_{template}.metadata")),
        serde_json::to_vec_pretty(&metadata)?,
    )?;

    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let path = dir.join(format!("{stamp}_{campaign}_{template}_generated.csv"));
    let mut out = BufWriter::new(File::create(&path)?);

    // Deterministic rows: id, recipient, p1_<i>, p2_<i>, ...
    for i in 0..rows {
        write!(&mut out, "{i},+6590{:06}", i % 1_000_000)?;
        for p in 1..=params {
            write!(&mut out, ",p{p}_{i}")?;
        }
        writeln!(&mut out)?;
        if i % 10_000 == 0 {
            out.flush()?;
        } // keep buffers moving on huge runs
    }

    out.flush()?;
    println!("{}", path.display());
    Ok(())
}
