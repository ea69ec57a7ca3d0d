use std::f64::consts::PI;

use tensegrity_sim::{point2, ConnectionSpec, Snapshot, TensegrityBuilder, TensegritySolver};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = TensegrityBuilder::new();
    builder.add_node("a", point2(0.0, 0.0))?;
    builder.add_node("b", point2(2.1, 0.3))?;
    builder.add_node("c", point2(0.0, 1.0))?;
    builder.add_connection(ConnectionSpec::bar(["a", "c"], 100.0).with_ratio(1.0));
    builder.add_connection(ConnectionSpec::string(["c", "b"], 10.0).with_target_force(2.5));
    builder.pin("a", &[true, true]);
    builder.pin("c", &[true, false]);
    builder.set_cylinder(1.0 / PI, [("a", "b")])?;

    let mut solver = TensegritySolver::new(builder.build()?);
    let report = solver.solve()?;
    println!("{}", Snapshot::capture(solver.tensegrity(), Some(&report)).to_json()?);

    Ok(())
}
