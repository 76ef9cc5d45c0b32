use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let resources = [
        sns_operator::resources::Topic::crd(),
        sns_operator::resources::Subscription::crd(),
    ];

    for resource in resources {
        println!("---");
        print!("{}", serde_yaml::to_string(&resource)?);
    }

    Ok(())
}
