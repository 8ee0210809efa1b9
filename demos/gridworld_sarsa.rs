// Example: SARSA(lambda) with an iFDD representation on a small gridworld
// The agent starts in one corner and is rewarded for reaching the other

use anyhow::Result;
use ifdd::{
    config::IfddConfig, DomainSpec, EGreedy, Ifdd, Representation, SarsaLambda,
};
use tracing::info;

const SIZE: f64 = 5.0;
const GOAL: [f64; 2] = [4.0, 4.0];
const MAX_STEPS: usize = 100;
const EPISODES: usize = 200;

// up, down, left, right
fn step(s: &[f64], a: usize) -> Vec<f64> {
    let (dr, dc) = match a {
        0 => (-1.0, 0.0),
        1 => (1.0, 0.0),
        2 => (0.0, -1.0),
        _ => (0.0, 1.0),
    };
    vec![
        (s[0] + dr).clamp(0.0, SIZE - 1.0),
        (s[1] + dc).clamp(0.0, SIZE - 1.0),
    ]
}

// One bin per cell: cell indices 0..SIZE-1 over limits [0, SIZE]
fn grid_domain() -> ifdd::FddResult<DomainSpec> {
    DomainSpec::discrete(&[(0.0, SIZE), (0.0, SIZE)], 4)
}

fn main() -> Result<()> {
    ifdd::init()?;

    let domain = grid_domain()?;
    let representation = Ifdd::new(
        &domain,
        IfddConfig {
            discovery_threshold: 0.05,
            use_cache: true,
            ..IfddConfig::default()
        },
    )?;
    let base_features = representation.features_num();
    let mut agent = SarsaLambda::new(representation, EGreedy::new(0.1, 7), 0.1, 0.5);
    let actions: Vec<usize> = (0..4).collect();

    println!("iFDD gridworld demo");
    println!("-------------------");

    for episode in 0..EPISODES {
        let mut s = vec![0.0, 0.0];
        let mut a = agent.act(&s, false, &actions)?;
        let mut steps = 0;
        loop {
            let ns = step(&s, a);
            let terminal = ns[..] == GOAL[..];
            let r = if terminal { 1.0 } else { -0.01 };
            let na = agent.act(&ns, terminal, &actions)?;
            agent.learn(&s, a, r, &ns, na, terminal)?;
            steps += 1;
            if terminal || steps >= MAX_STEPS {
                break;
            }
            s = ns;
            a = na;
        }
        if episode % 20 == 0 {
            info!(
                "episode {}: {} steps, {} features",
                episode,
                steps,
                agent.representation().features_num()
            );
        }
    }

    let representation = agent.representation();
    println!(
        "Discovered {} conjunctions on top of {} base features:",
        representation.features_num() - base_features,
        base_features
    );
    for index in base_features..representation.features_num() {
        if let Some(f_set) = representation.feature_set_string(index) {
            println!("  feature {}: {}", index, f_set);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_cell_has_its_own_bin() {
        let mut rep = Ifdd::new(&grid_domain().unwrap(), IfddConfig::default()).unwrap();
        assert_eq!(rep.features_num(), 2 * SIZE as usize);
        for cell in 0..SIZE as usize {
            let s = [cell as f64, cell as f64];
            let phi = rep.phi(&s, false).unwrap();
            assert_eq!(phi.active_indices(), vec![cell, SIZE as usize + cell]);
        }
        let goal = rep.phi(&GOAL, false).unwrap();
        let beside = rep.phi(&step(&GOAL, 0), false).unwrap();
        assert_ne!(goal.active_indices(), beside.active_indices());
    }
}
