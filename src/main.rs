use std::io;

use log::info;

use folio::index::BTreeIndex;
use folio::record::{CompOp, RecordStore, ScanCondition};
use folio::tuple::{format_tuple, AttrType, Attribute, TupleBuilder};

fn run() -> folio::Result<()> {
    let record_path = "demo.rec";
    let index_path = "demo_age.idx";

    let attrs = vec![
        Attribute::varchar("name", 64),
        Attribute::int("age"),
        Attribute::float("height"),
    ];

    RecordStore::create(record_path)?;
    let store = RecordStore::open(record_path)?;
    BTreeIndex::create(index_path, AttrType::Int)?;
    let mut index = BTreeIndex::open(index_path)?;
    println!("Created {} and {}\n", record_path, index_path);

    let people: [(&str, Option<i32>, f32); 5] = [
        ("Ada", Some(36), 1.65),
        ("Brian", Some(29), 1.80),
        ("Chen", None, 1.72),
        ("Dana", Some(36), 1.58),
        ("Emil", Some(41), 1.91),
    ];

    for (name, age, height) in people {
        let tuple = TupleBuilder::new(&attrs)
            .value(name)
            .value(age)
            .value(height)
            .build()?;
        let rid = store.insert(&attrs, &tuple)?;
        if let Some(age) = age {
            index.insert(&age.to_le_bytes(), rid)?;
        }
        println!("Inserted {} at {}", format_tuple(&attrs, &tuple)?, rid);
    }

    let first = folio::RecordId::new(folio::PageId::new(0), folio::SlotId::new(0));
    let renamed = TupleBuilder::new(&attrs)
        .value("Ada Lovelace, Countess of Lovelace")
        .value(36i32)
        .value(1.65f32)
        .build()?;
    store.update(&attrs, first, &renamed)?;
    println!("\nUpdated {}: {}", first, format_tuple(&attrs, &store.read(&attrs, first)?)?);

    println!("\nPeople aged 30 or more (name, age):");
    let condition = ScanCondition::new("age", CompOp::Ge, 30i32.to_le_bytes().to_vec());
    let projected = vec![attrs[0].clone(), attrs[1].clone()];
    let scan = store.scan(&attrs, Some(condition), &["name", "age"])?;
    for item in scan {
        let (rid, tuple) = item?;
        println!("  {} {}", rid, format_tuple(&projected, &tuple)?);
    }

    println!("\nIndex range 30..=40:");
    let (low, high) = (30i32.to_le_bytes(), 40i32.to_le_bytes());
    for item in index.scan(Some(&low[..]), Some(&high[..]), true, true)? {
        let (key, rid) = item?;
        let age = i32::from_le_bytes([key[0], key[1], key[2], key[3]]);
        println!("  {} -> {}", age, rid);
    }

    println!("\nIndex structure:");
    index.print_tree(&mut io::stdout())?;

    let counters = store.disk().collect_counters();
    info!(
        "record file I/O: {} reads, {} writes, {} appends",
        counters.reads, counters.writes, counters.appends
    );

    store.close()?;
    index.close()?;
    RecordStore::destroy(record_path)?;
    BTreeIndex::destroy(index_path)?;
    Ok(())
}

fn main() {
    env_logger::init();

    println!("Folio - slotted record files and B+ tree indexes");
    println!("================================================\n");

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
    println!("\nDemo completed successfully!");
}
