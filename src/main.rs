use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use tracing::Level;

use heapdb::{
    ColumnDef, DataType, Database, DatabaseConfig, DatabaseError, DatabaseResult, DbFileIterator,
    HeapFile, TableId, TupleDesc,
};

#[derive(Debug, Parser)]
#[command(name = "heapdb", version, about = "Build and inspect heap table files")]
struct Cli {
    /// Page size in bytes
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Buffer pool capacity in pages
    #[arg(long = "pages", global = true)]
    buffer_pool_pages: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a heap file from a headerless CSV file in one transaction
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Column types, e.g. int,string(16)
        #[arg(long, value_delimiter = ',', required = true)]
        types: Vec<DataType>,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Print every tuple of a heap file
    Print {
        file: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        types: Vec<DataType>,
    },
    /// Show page and tuple counts of a heap file
    Info {
        file: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        types: Vec<DataType>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> DatabaseResult<()> {
    let config = DatabaseConfig::default().with_overrides(cli.page_size, cli.buffer_pool_pages);
    let db = Database::new(config)?;

    match cli.command {
        Command::Convert {
            input,
            output,
            types,
            delimiter,
        } => convert(&db, &input, &output, &types, delimiter),
        Command::Print { file, types } => print(&db, &file, &types),
        Command::Info { file, types } => info(&db, &file, &types),
    }
}

/// Columns are unnamed in the CLI, so they get positional names
fn desc_for(types: &[DataType]) -> TupleDesc {
    TupleDesc::new(
        types
            .iter()
            .enumerate()
            .map(|(i, data_type)| ColumnDef::new(format!("f{}", i), *data_type))
            .collect(),
    )
}

fn open_existing(db: &Database, path: &Path, types: &[DataType]) -> DatabaseResult<TableId> {
    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )
        .into());
    }
    db.open_table(path, "data", desc_for(types), None)
}

fn convert(
    db: &Database,
    input: &Path,
    output: &Path,
    types: &[DataType],
    delimiter: char,
) -> DatabaseResult<()> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| DatabaseError::InvalidConfig(format!("delimiter {:?} is not ASCII", delimiter)))?;

    let file = HeapFile::create(output, Arc::new(desc_for(types)), db.config().page_size)?;
    let table_id = db.catalog().add_table(Arc::new(file), "data", None);

    let txn = db.begin();
    let rows = db.load_csv(txn.id(), table_id, input, delimiter)?;
    txn.commit()?;

    println!("Wrote {} rows to {}", rows, output.display());
    Ok(())
}

fn print(db: &Database, path: &Path, types: &[DataType]) -> DatabaseResult<()> {
    let table_id = open_existing(db, path, types)?;
    let txn = db.begin();
    let mut scan = db.scan(txn.id(), table_id, "data")?;

    let mut table = Table::new();
    table.set_titles(Row::new(
        scan.tuple_desc()
            .columns()
            .iter()
            .map(|c| Cell::new(&c.name))
            .collect(),
    ));

    scan.open()?;
    while scan.has_next()? {
        let tuple = scan.next()?;
        table.add_row(Row::new(
            tuple
                .values()
                .iter()
                .map(|v| Cell::new(&v.to_string()))
                .collect(),
        ));
    }
    scan.close();
    txn.commit()?;

    table.printstd();
    Ok(())
}

fn info(db: &Database, path: &Path, types: &[DataType]) -> DatabaseResult<()> {
    let table_id = open_existing(db, path, types)?;
    let file = db
        .catalog()
        .database_file(table_id)
        .ok_or_else(|| heapdb::CatalogError::TableNotFound(table_id.to_string()))?;

    let txn = db.begin();
    let mut scan = db.scan(txn.id(), table_id, "data")?;
    scan.open()?;
    let mut tuples = 0;
    while scan.has_next()? {
        scan.next()?;
        tuples += 1;
    }
    txn.commit()?;

    let layout = file.layout();
    println!("file:        {}", file.path().display());
    println!("table id:    {}", table_id);
    println!("schema:      {}", file.tuple_desc());
    println!("page size:   {}", layout.page_size());
    println!("record size: {}", layout.record_size());
    println!("slots/page:  {}", layout.slot_count());
    println!("pages:       {}", file.num_pages()?);
    println!("tuples:      {}", tuples);
    Ok(())
}
