mod learn_retrieve;
