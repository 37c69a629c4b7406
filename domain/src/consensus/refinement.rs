//! Prompt shown to every model when a round ends without consensus

use super::cluster::Cluster;

/// Build the refinement prompt for the next round.
///
/// Each cluster is summarized by its representative action, parameters and
/// reasoning together with how many models backed it.
pub fn build_refinement_prompt(clusters: &[Cluster], next_round: u32, max_rounds: u32) -> String {
    let mut prompt = format!(
        "[Consensus round {} of {}]\nThe models did not agree on the next action. \
         The proposals from the previous round were:\n",
        next_round, max_rounds
    );

    for (i, cluster) in clusters.iter().enumerate() {
        let rep = cluster.representative();
        let backers = if cluster.size() == 1 {
            "1 model".to_string()
        } else {
            format!("{} models", cluster.size())
        };
        prompt.push_str(&format!(
            "\nOption {} ({}): action={} params={}\n",
            i + 1,
            backers,
            rep.action,
            rep.params
        ));
        if !rep.reasoning.is_empty() {
            prompt.push_str(&format!("Reasoning: {}\n", rep.reasoning));
        }
    }

    prompt.push_str(
        "\nReconsider the options above and respond with the single action you now \
         think is best, in the same JSON format.",
    );
    if next_round >= max_rounds {
        prompt.push_str(" This is the final round; if no majority forms, the most supported option is taken.");
    }
    prompt
}
