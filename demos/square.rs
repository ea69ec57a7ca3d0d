use tensegrity_sim::{point2, render_summary, ConnectionSpec, TensegrityBuilder, TensegritySolver};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = TensegrityBuilder::new();
    for (name, x, y) in [("a", 0.0, 0.0), ("b", 1.0, 0.0), ("c", 1.0, 1.0), ("d", 0.0, 1.0)] {
        builder.add_node(name, point2(x, y))?;
    }
    for (name, start, end) in [("s1", "a", "b"), ("s2", "b", "c"), ("s3", "c", "d"), ("s4", "d", "a")] {
        builder.add_connection(ConnectionSpec::string([start, end], 1.0).with_ratio(0.9).named(name));
    }
    builder.add_connection(ConnectionSpec::bar(["a", "c"], 100.0).with_ratio(1.0));
    builder.add_connection(ConnectionSpec::bar(["b", "d"], 100.0).with_ratio(1.0));
    builder.pin("a", &[true, true]);
    builder.pin("b", &[false, true]);
    builder.add_control("s1");

    let mut solver = TensegritySolver::new(builder.build()?);
    let report = solver.solve()?;
    println!("{}", render_summary(solver.tensegrity(), Some(&report)));

    solver.tensegrity_mut().change_control_lengths(&[-0.1])?;
    let report = solver.solve()?;
    println!("{}", render_summary(solver.tensegrity(), Some(&report)));

    Ok(())
}
